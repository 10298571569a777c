//! Common error types for iisrecon.

use thiserror::Error;

/// Common error type for iisrecon operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Command execution failed: {cmd} - {reason}")]
    CommandExecution { cmd: String, reason: String },

    #[error("Command timed out after {seconds}s: {cmd}")]
    CommandTimeout { cmd: String, seconds: u64 },

    #[error("WinRM connection failed: {0}")]
    WinRmConnection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid report: {0}")]
    InvalidReport(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias using common Error.
pub type Result<T> = std::result::Result<T, Error>;

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}
