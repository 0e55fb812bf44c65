//! Storage error types.

use larkmd_core::BackendError;
use thiserror::Error;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from rusqlite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (e.g., creating directories).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

impl From<StorageError> for BackendError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Json(e) => BackendError::Serialization(e),
            StorageError::Database(rusqlite::Error::SqliteFailure(code, msg))
                if matches!(
                    code.code,
                    rusqlite::ErrorCode::ReadOnly
                        | rusqlite::ErrorCode::DiskFull
                        | rusqlite::ErrorCode::ConstraintViolation
                ) =>
            {
                BackendError::Rejected(msg.unwrap_or_else(|| code.to_string()))
            }
            other => BackendError::Unavailable(other.to_string()),
        }
    }
}
