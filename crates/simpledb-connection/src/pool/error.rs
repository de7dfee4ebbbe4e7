//! Pool error types

use std::time::Duration;

use simpledb_core::DbError;
use thiserror::Error;

/// Errors returned by pool operations
#[derive(Debug, Error)]
pub enum PoolError {
    /// The factory could not open a backend connection
    #[error("Failed to open connection: {0}")]
    Connection(#[source] DbError),

    /// No connection became available within the acquire timeout
    #[error("Timed out waiting for connection (timeout: {0:?})")]
    Timeout(Duration),

    /// The released connection is not checked out from this pool
    #[error("Connection is not checked out from this pool")]
    InvalidRelease,

    /// The pool has been shut down
    #[error("Connection pool is closed")]
    PoolClosed,

    /// The pool configuration was rejected
    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),
}

impl PoolError {
    /// Whether retrying the same operation later can succeed
    ///
    /// Only a timeout is transient; everything else needs intervention.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PoolError::Timeout(_))
    }
}

impl From<PoolError> for DbError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Connection(inner) => inner,
            other => DbError::Connection(other.to_string()),
        }
    }
}
