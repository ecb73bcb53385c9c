pub mod config;
pub mod error;
pub mod types;
pub mod workflow;

pub use config::{ConfigLoader, EngineConfig};
pub use error::{AppError, DefaultErrorReporter, ErrorReporter};
pub use types::*;
pub use workflow::{Workflow, WorkflowError, WorkflowTemplate};
