//! Core error types for `OpenUsage`.

use thiserror::Error;

/// Core error type for `OpenUsage` operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Provider id not recognized.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Invalid data in a stored document or API response.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
