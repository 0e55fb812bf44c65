//! Error types for the host-facing backends.

use thiserror::Error;

/// Errors raised by storage and permission backends.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend could not be reached (closed database, poisoned lock).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the write (read-only, quota exceeded).
    #[error("write rejected: {0}")]
    Rejected(String),

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The permission host failed to answer.
    #[error("permission request failed: {0}")]
    Permission(String),
}

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Error reported when persisting the domain config fails.
pub type StoreError = BackendError;
