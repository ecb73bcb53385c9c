use serde::{Deserialize, Serialize};

/// Error category enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    ValidationError,
    ResolutionError,
    ConcurrencyError,
    SerializationError,
    IoError,
    ConfigurationError,
    InternalError,
}

impl ErrorCategory {
    /// Code used when no more specific one is attached.
    pub fn default_code(self) -> &'static str {
        match self {
            ErrorCategory::ValidationError => "ERR-VALIDATION",
            ErrorCategory::ResolutionError => "ERR-RESOLUTION",
            ErrorCategory::ConcurrencyError => "ERR-CONCURRENCY",
            ErrorCategory::SerializationError => "ERR-SERIALIZATION",
            ErrorCategory::IoError => "ERR-IO",
            ErrorCategory::ConfigurationError => "ERR-CONFIG",
            ErrorCategory::InternalError => "ERR-INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
