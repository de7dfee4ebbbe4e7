//! Pool configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::PoolError;

/// Configuration for a connection pool
///
/// Controls pool sizing, the acquire timeout and how long a connection may
/// sit idle before it is evicted. Set once at pool construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of connections opened when the pool is created
    min_size: usize,
    /// Maximum number of connections open at the same time
    max_size: usize,
    /// Timeout in milliseconds when waiting for a connection
    acquire_timeout_ms: u64,
    /// Idle time in milliseconds after which a connection is evicted
    max_idle_ms: u64,
}

impl PoolConfig {
    /// Create a new pool configuration with the given min and max sizes
    ///
    /// Sizes are checked by [`PoolConfig::validate`], which the pool calls
    /// on construction.
    pub fn new(min_size: usize, max_size: usize) -> Self {
        Self {
            min_size,
            max_size,
            acquire_timeout_ms: 5_000,
            max_idle_ms: 30_000,
        }
    }

    pub fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the acquire timeout in milliseconds
    pub fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = timeout_ms;
        self
    }

    /// Set the maximum idle duration in milliseconds
    pub fn with_max_idle_ms(mut self, idle_ms: u64) -> Self {
        self.max_idle_ms = idle_ms;
        self
    }

    /// Get the minimum pool size
    pub fn min_size(&self) -> usize {
        self.min_size
    }

    /// Get the maximum pool size
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Get the acquire timeout as a Duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Get the maximum idle duration as a Duration
    pub fn max_idle(&self) -> Duration {
        Duration::from_millis(self.max_idle_ms)
    }

    /// Check the sizing and timeout constraints
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_size == 0 {
            return Err(PoolError::InvalidConfig(
                "max_size must be greater than 0".into(),
            ));
        }
        if self.min_size > self.max_size {
            return Err(PoolError::InvalidConfig(format!(
                "min_size ({}) cannot exceed max_size ({})",
                self.min_size, self.max_size
            )));
        }
        if self.acquire_timeout_ms == 0 {
            return Err(PoolError::InvalidConfig(
                "acquire_timeout must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    /// Create a default pool configuration
    ///
    /// Defaults:
    /// - min_size: 1
    /// - max_size: 2
    /// - acquire_timeout: 5 seconds
    /// - max_idle: 30 seconds
    fn default() -> Self {
        Self::new(1, 2)
    }
}
