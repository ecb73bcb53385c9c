use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::path::PathBuf;

/// Caller errors detected while building or attaching element sets and tasks.
#[derive(Debug, thiserror::Error)]
pub enum ValidationFault {
    #[error("the following parameters are associated with multiple input value definitions: {0:?}")]
    MultipleInputValues(Vec<String>),
    #[error("the following input parameters are unexpected: {0:?}")]
    UnexpectedInput(Vec<String>),
    #[error(
        "the input type {input_type:?} specified in sequence path {path:?} is unexpected; available input types are: {available:?}"
    )]
    UnexpectedSequenceInput {
        input_type: String,
        path: String,
        available: Vec<String>,
    },
    #[error("nesting_order must be >= 0 for all keys, but for key {path:?} the value {value} was specified")]
    InvalidNesting { path: String, value: f64 },
    #[error("all task schemas used within a task must share one objective, found: {0:?}")]
    MultipleSchemaObjectives(Vec<String>),
    #[error("task schema {0:?} not found")]
    UnknownTaskSchema(String),
    #[error("environment {0:?} not found")]
    UnknownEnvironment(String),
    #[error("invalid action scope {scope:?}: {reason}")]
    InvalidActionScope { scope: String, reason: String },
    #[error("if element_sets are provided, no other element set arguments are allowed")]
    ConflictingElementSetArguments,
    #[error("invalid parameter path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },
    #[error("duplicate task schema key {0:?}")]
    DuplicateTaskSchema(String),
    #[error("action rule must specify exactly one of check_exists and check_missing")]
    InvalidActionRule,
    #[error("a task needs at least one task schema")]
    MissingTaskSchema,
}

/// Engine fault type returned by every workflow operation.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationFault),
    #[error("the following inputs have no sources: {}", format_paths(.paths))]
    MissingInputs { paths: Vec<String> },
    #[error(
        "the input source {input_source:?} is not available for input path {path:?}; available input sources are: {available:?}"
    )]
    InvalidInputSource {
        path: String,
        input_source: String,
        available: Vec<String>,
    },
    #[error("input source {input_source:?} has an invalid task reference: {reason}")]
    InvalidTaskReference { input_source: String, reason: String },
    #[error(
        "all inputs with the same nesting_order must have the same multiplicity, but for paths {paths:?} with nesting_order {nesting_order} found multiplicities {multiplicities:?}"
    )]
    InconsistentNesting {
        nesting_order: f64,
        paths: Vec<String>,
        multiplicities: Vec<usize>,
    },
    #[error("workflow modified on disk since it was loaded")]
    ConcurrentModification,
    #[error("workflow parameter with group index {0} does not exist")]
    MissingParameterGroup(usize),
    #[error("element {element} has no data at path {path:?}")]
    PathNotFound { element: usize, path: String },
    #[error("no compatible environment is specified for the {action}")]
    MissingCompatibleEnvironment { action: String },
    #[error("no workflow found at path {}", .0.display())]
    WorkflowNotFound(PathBuf),
    #[error("a workflow already exists at path {}", .0.display())]
    WorkflowExists(PathBuf),
    #[error("task {0:?} does not exist in this workflow")]
    UnknownTask(String),
    #[error("element {0} does not exist in this workflow")]
    UnknownElement(usize),
    #[error("base element {element} does not belong to task {task:?}")]
    ForeignBaseElement { element: usize, task: String },
    #[error("storage fault: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
    #[error("serialization fault: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn format_paths(paths: &[String]) -> String {
    paths
        .iter()
        .map(|p| format!("{:?}", p))
        .collect::<Vec<_>>()
        .join(", ")
}

impl WorkflowError {
    pub fn storage<T: Into<String>>(message: T, source: std::io::Error) -> Self {
        WorkflowError::Storage {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Whether the fault is a transient filesystem permission race worth retrying.
    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            WorkflowError::Storage {
                source: Some(err),
                ..
            } if err.kind() == std::io::ErrorKind::PermissionDenied
        )
    }

    /// Stable diagnostic code.
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::Validation(fault) => match fault {
                ValidationFault::MultipleInputValues(_) => "WF-VAL-001",
                ValidationFault::UnexpectedInput(_) => "WF-VAL-002",
                ValidationFault::UnexpectedSequenceInput { .. } => "WF-VAL-003",
                ValidationFault::InvalidNesting { .. } => "WF-VAL-004",
                ValidationFault::MultipleSchemaObjectives(_) => "WF-VAL-005",
                ValidationFault::UnknownTaskSchema(_) => "WF-VAL-006",
                ValidationFault::UnknownEnvironment(_) => "WF-VAL-007",
                ValidationFault::InvalidActionScope { .. } => "WF-VAL-008",
                ValidationFault::ConflictingElementSetArguments => "WF-VAL-009",
                ValidationFault::InvalidPath { .. } => "WF-VAL-010",
                ValidationFault::DuplicateTaskSchema(_) => "WF-VAL-011",
                ValidationFault::InvalidActionRule => "WF-VAL-012",
                ValidationFault::MissingTaskSchema => "WF-VAL-013",
            },
            WorkflowError::MissingInputs { .. } => "WF-RES-001",
            WorkflowError::InvalidInputSource { .. } => "WF-RES-002",
            WorkflowError::InvalidTaskReference { .. } => "WF-RES-003",
            WorkflowError::InconsistentNesting { .. } => "WF-RES-004",
            WorkflowError::MissingCompatibleEnvironment { .. } => "WF-RES-005",
            WorkflowError::ConcurrentModification => "WF-CON-001",
            WorkflowError::MissingParameterGroup(_) => "WF-STO-001",
            WorkflowError::WorkflowNotFound(_) => "WF-STO-002",
            WorkflowError::WorkflowExists(_) => "WF-STO-003",
            WorkflowError::Storage { .. } => "WF-STO-004",
            WorkflowError::Serialization(_) => "WF-SER-001",
            WorkflowError::PathNotFound { .. } => "WF-QRY-001",
            WorkflowError::UnknownTask(_) => "WF-QRY-002",
            WorkflowError::UnknownElement(_) => "WF-QRY-003",
            WorkflowError::ForeignBaseElement { .. } => "WF-QRY-004",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            WorkflowError::Validation(_) => ErrorCategory::ValidationError,
            WorkflowError::MissingInputs { .. }
            | WorkflowError::InvalidInputSource { .. }
            | WorkflowError::InvalidTaskReference { .. }
            | WorkflowError::InconsistentNesting { .. }
            | WorkflowError::MissingCompatibleEnvironment { .. } => {
                ErrorCategory::ResolutionError
            }
            WorkflowError::ConcurrentModification => ErrorCategory::ConcurrencyError,
            WorkflowError::MissingParameterGroup(_)
            | WorkflowError::WorkflowNotFound(_)
            | WorkflowError::WorkflowExists(_)
            | WorkflowError::Storage { .. } => ErrorCategory::IoError,
            WorkflowError::Serialization(_) => ErrorCategory::SerializationError,
            WorkflowError::PathNotFound { .. }
            | WorkflowError::UnknownTask(_)
            | WorkflowError::UnknownElement(_)
            | WorkflowError::ForeignBaseElement { .. } => ErrorCategory::ValidationError,
        }
    }
}

impl From<WorkflowError> for AppError {
    fn from(err: WorkflowError) -> Self {
        let mut app = AppError::new(err.category(), err.to_string()).with_code(err.code());
        match &err {
            WorkflowError::MissingInputs { paths } => {
                app = app
                    .with_context("missing_inputs", paths.join(","))
                    .with_hint("give the listed inputs a local value, a default or an upstream task");
            }
            WorkflowError::ConcurrentModification => {
                app = app.with_hint("reload the workflow and redo the change");
            }
            WorkflowError::Storage { .. } => {
                app = app.with_hint("check file permissions and external sync tools");
            }
            _ => {}
        }
        app.source = Some(anyhow::Error::new(err));
        app
    }
}
