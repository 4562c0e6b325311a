//! Error types shared by the journal crates.

use thiserror::Error;

/// Result type alias for journal core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by local persistence and domain validation.
#[derive(Debug, Error)]
pub enum Error {
    /// Backing key/value store failure
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Input rejected before it reached storage
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Referenced record does not exist locally
    #[error("Not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Database(DatabaseError::Internal(message.into()))
    }
}
