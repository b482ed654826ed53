//! Error types for the heap dump webhook.

use std::path::PathBuf;
use thiserror::Error;

/// Errors reading or writing the persisted dedup record.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading the state file failed
    #[error("Failed to read state file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing or replacing the state file failed
    #[error("Failed to write state file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// State file is not a JSON object of strings
    #[error("Failed to parse state file: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored timestamp could not be parsed
    #[error("Invalid timestamp for key {key}: {value}")]
    InvalidTimestamp { key: String, value: String },

    /// Store unavailable (used by alternative backends)
    #[error("{0}")]
    Other(String),
}

/// Errors invoking the external diagnostic action.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The process could not be started
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The action wrote to stderr
    #[error("Action reported errors: {stderr}")]
    Stderr { stderr: String },

    /// The action exited unsuccessfully
    #[error("Action exited with {status}: {stderr}")]
    ExitStatus { status: String, stderr: String },

    /// The action did not finish in time and was killed
    #[error("Action timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// Errors for a webhook body that is not a usable alert batch.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// Body is not valid JSON
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Body is JSON but neither a list of alerts nor an object with `alerts`
    #[error("Unknown alert payload format: {0}")]
    Malformed(String),
}

/// Invalid service configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file could not be parsed
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field has an unusable value
    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
