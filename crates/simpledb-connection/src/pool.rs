//! Connection pooling for backend connections
//!
//! This module provides a bounded pool with a blocking, time-limited
//! `acquire`, lazy idle eviction and an explicit `close_all` shutdown.
//!
//! # Example
//!
//! ```ignore
//! use simpledb_connection::pool::{ConnectionPool, PoolConfig};
//!
//! let config = PoolConfig::new(1, 5)
//!     .with_acquire_timeout_ms(5_000)
//!     .with_max_idle_ms(30_000);
//!
//! let pool = ConnectionPool::new(config, connection_factory).await?;
//! let conn = pool.acquire().await?;
//! conn.query("SELECT 1", &[]).await?;
//! pool.release(conn)?;
//!
//! pool.close_all().await;
//! ```

mod config;
mod error;
mod factory;
mod pool;
mod state;
mod stats;

#[cfg(test)]
mod tests;

pub use config::PoolConfig;
pub use error::PoolError;
pub use factory::ConnectionFactory;
pub use pool::{ConnectionPool, PooledConnection};
pub use state::ConnectionId;
pub use stats::PoolStats;
