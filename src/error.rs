//! Error types for the bulletin orchestration system.

use std::time::Duration;
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl StorageError {
    pub(crate) fn from_sled(context: &str, err: sled::Error) -> Self {
        StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("{}: {}", context, err),
        ))
    }

    pub(crate) fn from_serde(key: &str, err: serde_json::Error) -> Self {
        StorageError::Corrupt {
            key: key.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Failure of a Generator or Publisher invocation.
///
/// The variant decides how the retry policy treats the failure; the message is
/// carried through to logs and the status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivityError {
    /// Network or upstream hiccup. Retried.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Invalid section, malformed target, bad credentials. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generator output could not be parsed. Retried like a transient error.
    #[error("Malformed content: {0}")]
    MalformedContent(String),

    /// The runtime gave up waiting on a single attempt.
    #[error("Activity attempt timed out after {0:?}")]
    Timeout(Duration),
}

impl ActivityError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, ActivityError::Configuration(_))
    }

    pub fn is_retryable(&self) -> bool {
        !self.is_configuration()
    }
}

/// API-level errors surfaced by the runtime, scheduler and CLI
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid section: {0}")]
    InvalidSection(String),

    #[error("Invalid workflow input: {0}")]
    InvalidInput(String),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Workflow already running: {0}")]
    AlreadyRunning(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
