//! Tracing setup for the command line: a log file under the workspace plus a
//! console sink that goes quiet when output is meant for another program.

pub mod config;
pub mod context;
pub mod layers;

pub use context::{detect_context, ExecutionContext};
pub use layers::console::ConsoleOutput;

use crate::cli::Args;
use crate::logging::config::LoggingConfig;
use crate::logging::layers::{console, file};
use crate::Result;
use anyhow::{anyhow, Context};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::Registry;

static LOGGER_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Keep alive until the command finishes so buffered file lines are written.
pub struct LoggingGuard {
    _file: WorkerGuard,
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
/// Fails if called twice in one process.
pub fn init(args: &Args) -> Result<LoggingGuard> {
    if LOGGER_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(anyhow!("logging already initialized"));
    }

    let workspace_root = args.workspace_root();
    let config = LoggingConfig::load(&workspace_root)?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("failed to configure tracing level")?;

    let (file_layer, guard) = file::file_layer::<Registry>(&file::log_file_path(&workspace_root))?;
    let output = console::select_console_output(detect_context(&args.command), config.console);
    let console_layer = console::console_layer::<file::FileLayerStack<Registry>>(output);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .with(env_filter)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(LoggingGuard { _file: guard })
}
