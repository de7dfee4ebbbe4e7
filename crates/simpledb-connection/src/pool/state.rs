//! Pool bookkeeping guarded by the pool mutex

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use simpledb_core::Connection;
use tokio::time::Instant;

/// Identifier of a connection, unique within one pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Get the raw numeric id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// An idle connection and the moment it became idle
pub(crate) struct IdleEntry {
    pub(crate) id: ConnectionId,
    pub(crate) connection: Arc<dyn Connection>,
    pub(crate) idle_since: Instant,
}

impl IdleEntry {
    fn is_expired(&self, now: Instant, max_idle: Duration) -> bool {
        now.saturating_duration_since(self.idle_since) > max_idle
    }
}

/// Outcome of looking for an idle connection
pub(crate) struct IdleLookup {
    /// A fresh connection, already moved to the in-use set
    pub(crate) found: Option<(ConnectionId, Arc<dyn Connection>)>,
    /// Expired connections removed from the pool; the caller closes them
    pub(crate) expired: Vec<Arc<dyn Connection>>,
}

/// Mutable pool state
///
/// `active_count` always equals `available.len() + in_use.len()`, and
/// `active_count + opening` never exceeds the pool's `max_size`.
#[derive(Default)]
pub(crate) struct PoolState {
    /// Idle connections, oldest release first
    available: VecDeque<IdleEntry>,
    /// Checked-out connections
    in_use: HashMap<ConnectionId, Arc<dyn Connection>>,
    /// Open connections (idle + in use)
    active_count: usize,
    /// Slots reserved by callers currently running the factory
    opening: usize,
    /// Callers suspended in `acquire`
    waiting: usize,
    next_id: u64,
    closed: bool,
}

impl PoolState {
    fn next_id(&mut self) -> ConnectionId {
        self.next_id += 1;
        ConnectionId(self.next_id)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn idle_count(&self) -> usize {
        self.available.len()
    }

    pub(crate) fn in_use_count(&self) -> usize {
        self.in_use.len()
    }

    pub(crate) fn active_count(&self) -> usize {
        self.active_count
    }

    pub(crate) fn waiting(&self) -> usize {
        self.waiting
    }

    /// Add a freshly opened connection to the idle queue
    pub(crate) fn push_idle(&mut self, connection: Arc<dyn Connection>, now: Instant) -> ConnectionId {
        let id = self.next_id();
        self.available.push_back(IdleEntry {
            id,
            connection,
            idle_since: now,
        });
        self.active_count += 1;
        id
    }

    /// Pop idle entries until a non-expired one is found
    ///
    /// Expired entries are dropped from the bookkeeping and handed back for
    /// closing; they never count as candidates.
    pub(crate) fn take_idle(&mut self, now: Instant, max_idle: Duration) -> IdleLookup {
        let mut expired = Vec::new();
        while let Some(entry) = self.available.pop_front() {
            if entry.is_expired(now, max_idle) {
                tracing::debug!(
                    connection = %entry.id,
                    idle_ms = now.saturating_duration_since(entry.idle_since).as_millis() as u64,
                    "evicting idle connection"
                );
                self.active_count -= 1;
                expired.push(entry.connection);
                continue;
            }
            self.in_use.insert(entry.id, entry.connection.clone());
            return IdleLookup {
                found: Some((entry.id, entry.connection)),
                expired,
            };
        }
        IdleLookup {
            found: None,
            expired,
        }
    }

    /// Whether another connection may be opened
    pub(crate) fn has_capacity(&self, max_size: usize) -> bool {
        self.active_count + self.opening < max_size
    }

    pub(crate) fn reserve_slot(&mut self) {
        self.opening += 1;
    }

    pub(crate) fn cancel_slot(&mut self) {
        self.opening -= 1;
    }

    /// Turn a reserved slot into a checked-out connection
    pub(crate) fn fill_slot(&mut self, connection: Arc<dyn Connection>) -> ConnectionId {
        self.opening -= 1;
        let id = self.next_id();
        self.in_use.insert(id, connection);
        self.active_count += 1;
        id
    }

    /// Move a checked-out connection back to the idle queue
    ///
    /// Returns `false` when `id` is not checked out. A connection that was
    /// closed while checked out is discarded instead of queued.
    pub(crate) fn check_in(&mut self, id: ConnectionId, now: Instant) -> bool {
        let Some(connection) = self.in_use.remove(&id) else {
            return false;
        };
        if connection.is_closed() {
            tracing::debug!(connection = %id, "discarding closed connection on release");
            self.active_count -= 1;
            return true;
        }
        self.available.push_back(IdleEntry {
            id,
            connection,
            idle_since: now,
        });
        true
    }

    pub(crate) fn add_waiter(&mut self) {
        self.waiting += 1;
    }

    pub(crate) fn remove_waiter(&mut self) {
        self.waiting -= 1;
    }

    /// Mark the pool closed and take every tracked connection out of it
    pub(crate) fn shut_down(&mut self) -> Vec<Arc<dyn Connection>> {
        self.closed = true;
        let mut drained: Vec<_> = self.available.drain(..).map(|e| e.connection).collect();
        drained.extend(self.in_use.drain().map(|(_, c)| c));
        self.active_count = 0;
        drained
    }

    /// Check the counting invariants
    #[cfg(test)]
    pub(crate) fn invariants_hold(&self, max_size: usize) -> bool {
        self.active_count == self.available.len() + self.in_use.len()
            && self.active_count + self.opening <= max_size
    }
}
