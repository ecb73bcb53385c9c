#![allow(clippy::result_large_err)]

use super::EngineConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::env;
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config from workspace root (workspace/paramflow.toml)
    /// Environment variables override config file values
    pub fn load_from_workspace(workspace_path: &Path) -> Result<EngineConfig, AppError> {
        let config_path = workspace_path.join("paramflow.toml");
        let mut config = Self::load_from_file(&config_path)?.unwrap_or_default();
        Self::apply_env_overrides(&mut config)?;
        Self::validate_config(&config)?;
        Ok(config)
    }

    /// Load config from specific file path
    /// Returns Ok(None) if file doesn't exist
    pub fn load_from_file(path: &Path) -> Result<Option<EngineConfig>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to read config file {}: {}", path.display(), e),
            )
        })?;

        let config: EngineConfig = toml::from_str(&content).map_err(|e| {
            AppError::new(
                ErrorCategory::ConfigurationError,
                format!("Failed to parse config file {}: {}", path.display(), e),
            )
        })?;

        Ok(Some(config))
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(config: &mut EngineConfig) -> Result<(), AppError> {
        if let Ok(raw) = env::var("PARAMFLOW_ARRAY_EXTRACT_THRESHOLD") {
            config.store.array_extract_threshold =
                parse_env("PARAMFLOW_ARRAY_EXTRACT_THRESHOLD", &raw)?;
        }

        if let Ok(raw) = env::var("PARAMFLOW_RETRY_TRIES") {
            config.retry.tries = parse_env("PARAMFLOW_RETRY_TRIES", &raw)?;
        }

        if let Ok(raw) = env::var("PARAMFLOW_RETRY_DELAY") {
            config.retry.delay = humantime::parse_duration(raw.trim()).map_err(|e| {
                AppError::new(
                    ErrorCategory::ConfigurationError,
                    format!("PARAMFLOW_RETRY_DELAY is not a valid duration: {}", e),
                )
            })?;
        }

        if let Ok(raw) = env::var("PARAMFLOW_RETRY_BACKOFF") {
            config.retry.backoff = parse_env("PARAMFLOW_RETRY_BACKOFF", &raw)?;
        }

        if let Ok(dir) = env::var("PARAMFLOW_WORKFLOW_DIR") {
            config.workflow.default_dir = PathBuf::from(dir);
        }

        Ok(())
    }

    /// Get documentation for supported environment variables
    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "PARAMFLOW_ARRAY_EXTRACT_THRESHOLD - Minimum numeric array length stored as a child object (default: 16)",
            "PARAMFLOW_RETRY_TRIES - Attempts for transient storage faults (default: 10)",
            "PARAMFLOW_RETRY_DELAY - Delay before the first retry, e.g. 1s or 200ms (default: 1s)",
            "PARAMFLOW_RETRY_BACKOFF - Delay multiplier between retries (default: 2.0)",
            "PARAMFLOW_WORKFLOW_DIR - Directory new workflows are created in (default: .)",
        ]
    }

    /// Validate configuration values
    pub fn validate_config(config: &EngineConfig) -> Result<(), AppError> {
        if config.store.array_extract_threshold == 0 {
            return Err(AppError::new(
                ErrorCategory::ConfigurationError,
                "store.array_extract_threshold must be >= 1",
            ));
        }

        if config.store.metadata_file.trim().is_empty() {
            return Err(AppError::new(
                ErrorCategory::ConfigurationError,
                "store.metadata_file cannot be empty",
            ));
        }

        if config.retry.tries == 0 {
            return Err(AppError::new(
                ErrorCategory::ConfigurationError,
                "retry.tries must be >= 1",
            ));
        }

        if !(config.retry.backoff >= 1.0) {
            return Err(AppError::new(
                ErrorCategory::ConfigurationError,
                "retry.backoff must be >= 1.0",
            ));
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, AppError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| {
        AppError::new(
            ErrorCategory::ConfigurationError,
            format!("{} has an invalid value {:?}: {}", name, raw, e),
        )
    })
}
