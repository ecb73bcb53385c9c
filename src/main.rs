use clap::Parser;
use paramflow::cli::{self, Args};
use paramflow::core::{AppError, DefaultErrorReporter, ErrorReporter, WorkflowError};
use paramflow::logging;
use std::process::ExitCode;

fn into_app_error(err: anyhow::Error) -> AppError {
    match err.downcast::<AppError>() {
        Ok(app) => app,
        Err(err) => match err.downcast::<WorkflowError>() {
            Ok(workflow) => workflow.into(),
            Err(other) => other.into(),
        },
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let reporter = DefaultErrorReporter::new();
    let _guard = match logging::init(&args) {
        Ok(guard) => Some(guard),
        Err(err) => {
            reporter.report_warning("logging disabled", Some(err.to_string()));
            None
        }
    };

    match cli::run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            reporter.report_error(&into_app_error(err));
            ExitCode::FAILURE
        }
    }
}
