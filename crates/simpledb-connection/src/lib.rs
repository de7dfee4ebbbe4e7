//! SimpleDb Connection - Connection pooling
//!
//! This crate owns the lifecycle of backend connections: it opens them through
//! a [`ConnectionFactory`], hands them out one caller at a time, recycles them
//! on release, evicts the ones that sat idle too long, and closes everything on
//! shutdown.

pub mod pool;

pub use pool::{
    ConnectionFactory, ConnectionId, ConnectionPool, PoolConfig, PoolError, PoolStats,
    PooledConnection,
};
