//! User-facing error type and the reporter that prints it.

use crate::core::types::ErrorCategory;
use std::collections::BTreeMap;
use std::fmt;

/// A failure as shown at the command line.
///
/// `code` is stable for a given kind of failure (`WF-STO-002`, `ERR-IO`, ...)
/// so scripts can match on it; `context` and `hints` are printed below it.
#[derive(Debug)]
pub struct AppError {
    pub category: ErrorCategory,
    pub code: String,
    pub message: String,
    pub context: BTreeMap<String, String>,
    pub hints: Vec<String>,
    pub source: Option<anyhow::Error>,
}

impl AppError {
    pub fn new<T: Into<String>>(category: ErrorCategory, message: T) -> Self {
        AppError {
            category,
            code: category.default_code().to_string(),
            message: message.into(),
            context: BTreeMap::new(),
            hints: Vec::new(),
            source: None,
        }
    }

    pub fn with_code<T: Into<String>>(mut self, code: T) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_context<T: Into<String>>(mut self, key: &str, value: T) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    pub fn with_hint<T: Into<String>>(mut self, hint: T) -> Self {
        self.hints.push(hint.into());
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.category, self.message)?;
        for (key, value) in &self.context {
            write!(f, "\n  {}: {}", key, value)?;
        }
        if let Some(source) = &self.source {
            write!(f, "\nCaused by: {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        let mut app = AppError::new(ErrorCategory::InternalError, err.to_string());
        app.source = Some(err);
        app
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        let mut app = AppError::new(ErrorCategory::IoError, err.to_string())
            .with_hint("check that the path exists and is writable");
        app.source = Some(anyhow::Error::new(err));
        app
    }
}

pub trait ErrorReporter {
    fn report_error(&self, error: &AppError);
    fn report_warning(&self, message: &str, detail: Option<String>);
}

/// Writes reports to stderr, one `[LEVEL] ...` header line per report.
#[derive(Debug, Default)]
pub struct DefaultErrorReporter;

impl DefaultErrorReporter {
    pub fn new() -> Self {
        DefaultErrorReporter
    }
}

impl ErrorReporter for DefaultErrorReporter {
    fn report_error(&self, error: &AppError) {
        eprintln!("[ERROR] {}: {}", error.code, error.message);
        for (key, value) in &error.context {
            eprintln!("  {}: {}", key, value);
        }
        for hint in &error.hints {
            eprintln!("  hint: {}", hint);
        }
    }

    fn report_warning(&self, message: &str, detail: Option<String>) {
        eprintln!("[WARNING] {}", message);
        if let Some(detail) = detail {
            eprintln!("  {}", detail);
        }
    }
}
