//! Error types for the store crate.

use thiserror::Error;

/// Errors that can occur in the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database connection or operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Requested resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid UUID format.
    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    /// Invalid data or state.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
