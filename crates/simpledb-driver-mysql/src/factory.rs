//! Pool integration for the MySQL backend

use std::sync::Arc;

use async_trait::async_trait;
use simpledb_connection::ConnectionFactory;
use simpledb_core::{Connection, ConnectionConfig, Result};

use crate::MySqlConnection;

/// Port used when the configuration leaves it unset
pub const DEFAULT_PORT: u16 = 3306;

/// Opens MySQL sessions on behalf of a [`simpledb_connection::ConnectionPool`]
#[derive(Debug, Clone)]
pub struct MySqlConnectionFactory {
    config: ConnectionConfig,
}

impl MySqlConnectionFactory {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    /// The settings every new session is opened with
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

#[async_trait]
impl ConnectionFactory for MySqlConnectionFactory {
    #[tracing::instrument(skip(self), fields(host = %self.config.host, database = self.config.get_string("database").as_deref()))]
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        let connection = MySqlConnection::connect(&self.config).await?;
        Ok(Arc::new(connection))
    }
}
