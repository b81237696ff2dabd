//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::ApiError;

/// Map domain/service errors to a string for CLI output.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::ConfigError(msg) => format!("Configuration problem: {}", msg),
        ApiError::StorageError(inner) => format!(
            "Storage problem: {} (is another bulletin process using the same data directory?)",
            inner
        ),
        other => other.to_string(),
    }
}
