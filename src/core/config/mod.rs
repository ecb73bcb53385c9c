pub mod loader;

pub use loader::ConfigLoader;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration loaded from paramflow.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EngineConfig {
    /// Persistent store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Retry policy for transient storage faults
    #[serde(default)]
    pub retry: RetryConfig,

    /// Workflow placement
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

/// Persistent store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Minimum length of a homogeneous numeric array before it is stored as a child object
    #[serde(default = "default_array_extract_threshold")]
    pub array_extract_threshold: usize,

    /// Root metadata file name inside a workflow directory
    #[serde(default = "default_metadata_file")]
    pub metadata_file: String,
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first
    #[serde(default = "default_retry_tries")]
    pub tries: u32,

    /// Delay before the first retry (humantime, e.g. "1s", "250ms")
    #[serde(
        default = "default_retry_delay",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub delay: Duration,

    /// Multiplier applied to the delay after each retry
    #[serde(default = "default_retry_backoff")]
    pub backoff: f64,
}

/// Workflow placement configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowConfig {
    /// Directory new workflows are created in when no path is given
    #[serde(default = "default_workflow_dir")]
    pub default_dir: PathBuf,
}

fn default_array_extract_threshold() -> usize {
    16
}

fn default_metadata_file() -> String {
    "metadata.json".to_string()
}

fn default_retry_tries() -> u32 {
    10
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_retry_backoff() -> f64 {
    2.0
}

fn default_workflow_dir() -> PathBuf {
    PathBuf::from(".")
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*duration).to_string())
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            array_extract_threshold: default_array_extract_threshold(),
            metadata_file: default_metadata_file(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            tries: default_retry_tries(),
            delay: default_retry_delay(),
            backoff: default_retry_backoff(),
        }
    }
}

impl RetryConfig {
    /// A policy that never waits; used where retries must not slow things down.
    pub fn immediate(tries: u32) -> Self {
        RetryConfig {
            tries,
            delay: Duration::ZERO,
            backoff: 1.0,
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        WorkflowConfig {
            default_dir: default_workflow_dir(),
        }
    }
}
