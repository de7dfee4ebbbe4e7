//! Connection factory trait

use std::sync::Arc;

use async_trait::async_trait;
use simpledb_core::{Connection, Result};

/// Factory trait for opening new backend connections
///
/// The pool treats the factory as a black box that may be slow or fail; it
/// never retries a failed `create` on its own.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Open a new connection
    async fn create(&self) -> Result<Arc<dyn Connection>>;
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        (**self).create().await
    }
}
