//! Append-only log file kept under the workspace.

use crate::Result;
use anyhow::Context;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::Subscriber;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::{self as tracing_fmt, format};
use tracing_subscriber::registry::LookupSpan;

pub type FileFmtLayer<S> =
    tracing_fmt::Layer<S, format::DefaultFields, format::Format<format::Full>, NonBlocking>;

/// Subscriber with the file layer applied, as seen by layers stacked on top.
pub type FileLayerStack<S> = tracing_subscriber::layer::Layered<FileFmtLayer<S>, S>;

pub const LOG_FILE: &str = "paramflow.log";

/// `<workspace>/.paramflow/logs/paramflow.log`
pub fn log_file_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(".paramflow").join("logs").join(LOG_FILE)
}

/// Open `log_file` for appending behind a non-blocking writer. Lines still
/// queued are flushed when the returned guard drops.
pub fn file_layer<S>(log_file: &Path) -> Result<(FileFmtLayer<S>, WorkerGuard)>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    if let Some(dir) = log_file.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(file);
    let layer = tracing_fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false);
    Ok((layer, guard))
}
