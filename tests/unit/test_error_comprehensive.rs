use paramflow::core::error::{AppError, DefaultErrorReporter, ErrorReporter};
use paramflow::core::types::ErrorCategory;
use paramflow::core::workflow::{ValidationFault, WorkflowError};
use std::io;
use std::path::PathBuf;

#[test]
fn test_every_category_has_a_distinct_default_code() {
    let categories = [
        ErrorCategory::ValidationError,
        ErrorCategory::ResolutionError,
        ErrorCategory::ConcurrencyError,
        ErrorCategory::SerializationError,
        ErrorCategory::IoError,
        ErrorCategory::ConfigurationError,
        ErrorCategory::InternalError,
    ];

    let mut codes = Vec::new();
    for category in categories {
        let error = AppError::new(category, "test message");
        assert_eq!(error.category, category);
        assert_eq!(error.message, "test message");
        assert!(error.context.is_empty());
        assert!(error.hints.is_empty());
        assert!(error.source.is_none());
        assert!(error.code.starts_with("ERR-"));
        codes.push(error.code);
    }
    codes.sort();
    codes.dedup();
    assert_eq!(codes.len(), categories.len());
}

#[test]
fn test_error_context_is_keyed() {
    let error = AppError::new(ErrorCategory::ResolutionError, "no sources")
        .with_context("task", "simulate")
        .with_context("element_set", "0")
        .with_context("task", "sweep");

    assert_eq!(error.context.len(), 2);
    assert_eq!(error.context.get("task"), Some(&"sweep".to_string()));
    assert_eq!(error.context.get("element_set"), Some(&"0".to_string()));
}

#[test]
fn test_error_display_includes_code_category_and_context() {
    let error = AppError::new(ErrorCategory::ConfigurationError, "bad backoff")
        .with_code("CFG-1")
        .with_context("path", "paramflow.toml");

    let rendered = error.to_string();
    assert!(rendered.starts_with("[CFG-1] ConfigurationError: bad backoff"));
    assert!(rendered.contains("path: paramflow.toml"));
}

#[test]
fn test_error_hints_accumulate() {
    let error = AppError::new(ErrorCategory::IoError, "locked")
        .with_hint("close other programs")
        .with_hint("retry later");
    assert_eq!(
        error.hints,
        vec!["close other programs".to_string(), "retry later".to_string()]
    );
}

#[test]
fn test_io_error_conversion() {
    let error: AppError = io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
    assert_eq!(error.code, "ERR-IO");
    assert_eq!(error.category, ErrorCategory::IoError);
    assert!(!error.hints.is_empty());
    assert!(error.to_string().contains("Caused by: denied"));
}

#[test]
fn test_anyhow_error_conversion() {
    let error: AppError = anyhow::anyhow!("boom").into();
    assert_eq!(error.code, "ERR-INTERNAL");
    assert_eq!(error.category, ErrorCategory::InternalError);
    assert_eq!(error.message, "boom");
    assert!(error.source.is_some());
}

#[test]
fn test_missing_inputs_conversion() {
    let error: AppError = WorkflowError::MissingInputs {
        paths: vec!["p1".to_string(), "p2".to_string()],
    }
    .into();

    assert_eq!(error.code, "WF-RES-001");
    assert_eq!(error.category, ErrorCategory::ResolutionError);
    assert_eq!(error.context.get("missing_inputs"), Some(&"p1,p2".to_string()));
    assert_eq!(error.hints.len(), 1);
    assert!(error.message.contains("\"p1\""));
}

#[test]
fn test_workflow_error_categories() {
    let cases: Vec<(WorkflowError, &str, ErrorCategory)> = vec![
        (
            ValidationFault::UnexpectedInput(vec!["q".to_string()]).into(),
            "WF-VAL-002",
            ErrorCategory::ValidationError,
        ),
        (
            WorkflowError::ConcurrentModification,
            "WF-CON-001",
            ErrorCategory::ConcurrencyError,
        ),
        (
            WorkflowError::WorkflowNotFound(PathBuf::from("/tmp/none")),
            "WF-STO-002",
            ErrorCategory::IoError,
        ),
        (
            WorkflowError::UnknownElement(3),
            "WF-QRY-003",
            ErrorCategory::ValidationError,
        ),
        (
            WorkflowError::MissingCompatibleEnvironment {
                action: "main command".to_string(),
            },
            "WF-RES-005",
            ErrorCategory::ResolutionError,
        ),
    ];

    for (workflow_error, code, category) in cases {
        assert_eq!(workflow_error.code(), code);
        let app: AppError = workflow_error.into();
        assert_eq!(app.code, code);
        assert_eq!(app.category, category);
        assert!(app.source.is_some());
    }
}

#[test]
fn test_permission_denied_is_detected() {
    let denied = WorkflowError::storage(
        "write metadata",
        io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
    );
    assert!(denied.is_permission_denied());
    assert_eq!(denied.code(), "WF-STO-004");

    let missing = WorkflowError::storage(
        "write metadata",
        io::Error::new(io::ErrorKind::NotFound, "missing"),
    );
    assert!(!missing.is_permission_denied());
}

#[test]
fn test_error_reporter_does_not_panic() {
    let reporter = DefaultErrorReporter::new();
    let error = AppError::new(ErrorCategory::ValidationError, "reported")
        .with_context("path", "inputs.p1")
        .with_hint("fix the template");

    reporter.report_error(&error);
    reporter.report_warning("warning", Some("details".to_string()));
    reporter.report_warning("warning", None);
}
