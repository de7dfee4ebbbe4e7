//! Error types for SimpleDb backend operations

use thiserror::Error;

/// Core error type for backend operations
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl DbError {
    /// Whether this error came from the transport rather than the statement
    pub fn is_connection_error(&self) -> bool {
        matches!(self, DbError::Connection(_) | DbError::Io(_))
    }
}

/// Result type alias for backend operations
pub type Result<T> = std::result::Result<T, DbError>;
