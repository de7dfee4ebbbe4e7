//! Query errors

use simpledb_connection::PoolError;
use simpledb_core::DbError;
use thiserror::Error;

pub type SqlResult<T> = Result<T, QueryError>;

/// Errors returned by [`crate::Sql`] and [`crate::SimpleDb`] operations
#[derive(Debug, Error)]
pub enum QueryError {
    /// No connection could be obtained from the pool
    #[error("Connection pool error: {0}")]
    Pool(#[from] PoolError),

    /// The backend rejected or failed the statement
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// A result value did not have the requested shape
    #[error("Failed to decode result: {0}")]
    Decode(String),
}

impl QueryError {
    /// Whether retrying the same call may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            QueryError::Pool(e) => e.is_recoverable(),
            QueryError::Database(e) => e.is_connection_error(),
            QueryError::Decode(_) => false,
        }
    }
}
