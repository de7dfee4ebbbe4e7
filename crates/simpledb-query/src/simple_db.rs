//! The `SimpleDb` facade

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use simpledb_connection::{ConnectionPool, PoolConfig};
use simpledb_core::{ConnectionConfig, Value};
use simpledb_driver_mysql::MySqlConnectionFactory;

use crate::error::SqlResult;
use crate::sql::Sql;

/// Entry point for running SQL against a pooled database
///
/// Cloning is cheap; clones share the pool and the dev-mode switch.
#[derive(Debug, Clone)]
pub struct SimpleDb {
    pool: ConnectionPool,
    dev_mode: Arc<AtomicBool>,
}

impl SimpleDb {
    /// Wrap an existing pool
    pub fn new(pool: ConnectionPool) -> Self {
        Self {
            pool,
            dev_mode: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open a MySQL-backed pool, pre-warming `min_size` connections
    #[tracing::instrument(skip(connection, pool), fields(host = %connection.host))]
    pub async fn connect_mysql(connection: ConnectionConfig, pool: PoolConfig) -> SqlResult<Self> {
        let pool = ConnectionPool::new(pool, MySqlConnectionFactory::new(connection)).await?;
        tracing::info!(stats = ?pool.stats(), "SimpleDb ready");
        Ok(Self::new(pool))
    }

    /// Log every statement and its parameters at info level
    pub fn set_dev_mode(&self, enabled: bool) {
        self.dev_mode.store(enabled, Ordering::Relaxed);
    }

    pub fn is_dev_mode(&self) -> bool {
        self.dev_mode.load(Ordering::Relaxed)
    }

    /// Execute one statement and return the number of affected rows
    pub async fn run(&self, sql: &str, args: &[Value]) -> SqlResult<u64> {
        self.gen_sql().append(sql, args).update().await
    }

    /// Start building a statement
    ///
    /// The builder takes the dev-mode setting current at this call.
    pub fn gen_sql(&self) -> Sql {
        Sql::new(self.pool.clone(), self.is_dev_mode())
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Close every pooled connection; returns how many were closed
    pub async fn close(&self) -> usize {
        self.pool.close_all().await
    }
}
