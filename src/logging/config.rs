//! Logging settings.
//!
//! Read from `<workspace>/.paramflow/config/logging.toml`:
//!
//! ```toml
//! [logging]
//! level = "paramflow=debug"
//! console = "stderr"
//! ```
//!
//! `PARAMFLOW_LOG_LEVEL` and `PARAMFLOW_LOG_CONSOLE` override the file.

use crate::logging::layers::console::ConsoleOutput;
use crate::Result;
use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::filter::EnvFilter;

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
    /// `None` lets the execution context decide.
    pub console: Option<ConsoleOutput>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            console: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoggingFile {
    #[serde(default)]
    logging: LoggingSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoggingSection {
    level: Option<String>,
    console: Option<ConsoleOutput>,
}

pub fn config_path(workspace_root: &Path) -> PathBuf {
    workspace_root
        .join(".paramflow")
        .join("config")
        .join("logging.toml")
}

impl LoggingConfig {
    pub fn load(workspace_root: &Path) -> Result<Self> {
        let mut config = LoggingConfig::default();

        let path = config_path(workspace_root);
        if path.is_file() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let file: LoggingFile = toml::from_str(&text)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            if let Some(level) = file.logging.level {
                config.level = level;
            }
            if file.logging.console.is_some() {
                config.console = file.logging.console;
            }
        }

        if let Some(level) = env_value("PARAMFLOW_LOG_LEVEL") {
            config.level = level;
        }
        if let Some(console) = env_value("PARAMFLOW_LOG_CONSOLE") {
            config.console = Some(console.parse().map_err(|err: String| anyhow!(err))?);
        }

        EnvFilter::try_new(&config.level)
            .with_context(|| format!("invalid log level '{}'", config.level))?;
        Ok(config)
    }
}

fn env_value(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
