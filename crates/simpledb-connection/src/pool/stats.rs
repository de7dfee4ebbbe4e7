//! Point-in-time view of pool occupancy

use serde::{Deserialize, Serialize};

/// Counts taken under the pool lock by [`super::ConnectionPool::stats`]
///
/// `total == idle + in_use` always holds for a snapshot taken from a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    total: usize,
    idle: usize,
    in_use: usize,
    waiting: usize,
}

impl PoolStats {
    pub fn new(total: usize, idle: usize, in_use: usize, waiting: usize) -> Self {
        Self {
            total,
            idle,
            in_use,
            waiting,
        }
    }

    /// Open connections
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn idle(&self) -> usize {
        self.idle
    }

    /// Connections checked out to callers
    pub fn in_use(&self) -> usize {
        self.in_use
    }

    /// Callers suspended in `acquire`
    pub fn waiting(&self) -> usize {
        self.waiting
    }

    /// Whether some caller is blocked because nothing is idle
    pub fn has_contention(&self) -> bool {
        self.waiting > 0 && self.idle == 0
    }
}
