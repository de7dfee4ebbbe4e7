//! Connection pool implementation

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;
use simpledb_core::Connection;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::config::PoolConfig;
use super::error::PoolError;
use super::factory::ConnectionFactory;
use super::state::{ConnectionId, PoolState};
use super::stats::PoolStats;

/// State shared between the pool handle and its checked-out connections
struct PoolShared {
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory>,
    state: Mutex<PoolState>,
    /// Woken whenever a connection or a capacity slot frees up, and on shutdown
    released: Notify,
}

impl PoolShared {
    /// Return a checked-out connection to the idle queue
    fn check_in(&self, id: ConnectionId) -> Result<(), PoolError> {
        {
            let mut state = self.state.lock();
            if state.is_closed() {
                return Err(PoolError::PoolClosed);
            }
            if !state.check_in(id, Instant::now()) {
                return Err(PoolError::InvalidRelease);
            }
        }
        tracing::trace!(connection = %id, "connection returned to pool");
        self.released.notify_waiters();
        Ok(())
    }
}

/// Result of one pass over the pool state
enum Attempt {
    Ready(PooledConnection),
    Open(SlotReservation),
    Exhausted,
}

/// A connection pool that manages a bounded set of backend connections
///
/// The pool hands each connection to at most one caller at a time. Callers
/// give connections back with [`ConnectionPool::release`]; a
/// [`PooledConnection`] that is dropped without being released is returned
/// automatically.
///
/// Cloning the pool is cheap and yields another handle to the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    /// Create a new connection pool and open `min_size` connections
    ///
    /// If the factory fails while pre-warming, the connections opened so far
    /// are closed before the error is returned.
    #[tracing::instrument(skip_all, fields(min_size = config.min_size(), max_size = config.max_size()))]
    pub async fn new<F: ConnectionFactory>(config: PoolConfig, factory: F) -> Result<Self, PoolError> {
        config.validate()?;
        let factory: Arc<dyn ConnectionFactory> = Arc::new(factory);

        let mut warmed = Vec::with_capacity(config.min_size());
        for _ in 0..config.min_size() {
            match factory.create().await {
                Ok(conn) => warmed.push(conn),
                Err(e) => {
                    tracing::error!(error = %e, opened = warmed.len(), "failed to pre-warm connection pool");
                    close_connections(warmed).await;
                    return Err(PoolError::Connection(e));
                }
            }
        }

        let mut state = PoolState::default();
        let now = Instant::now();
        for conn in warmed {
            state.push_idle(conn, now);
        }

        tracing::info!(
            idle = state.idle_count(),
            acquire_timeout_ms = config.acquire_timeout().as_millis() as u64,
            max_idle_ms = config.max_idle().as_millis() as u64,
            "connection pool created"
        );

        Ok(Self {
            shared: Arc::new(PoolShared {
                config,
                factory,
                state: Mutex::new(state),
                released: Notify::new(),
            }),
        })
    }

    /// Get a connection from the pool
    ///
    /// This will:
    /// 1. Hand out the oldest idle connection, closing any that sat idle too long
    /// 2. If none is idle and the pool is under `max_size`, open a new connection
    /// 3. Otherwise wait for a release, re-checking from step 1 on every wake
    ///
    /// Fails with [`PoolError::Timeout`] once `acquire_timeout` has elapsed.
    /// The budget covers opening a new connection as well as waiting.
    /// Fails with [`PoolError::Connection`] as soon as the factory fails, and
    /// with [`PoolError::PoolClosed`] after [`ConnectionPool::close_all`].
    pub async fn acquire(&self) -> Result<PooledConnection, PoolError> {
        let timeout = self.shared.config.acquire_timeout();
        let deadline = Instant::now() + timeout;
        let mut waiter: Option<WaiterGuard> = None;

        loop {
            // Register for the wake-up before looking at the state so that a
            // release landing in between is not missed.
            let notified = self.shared.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_acquire(deadline).await? {
                Attempt::Ready(conn) => return Ok(conn),
                Attempt::Open(slot) => return self.open_connection(slot, deadline).await,
                Attempt::Exhausted => {}
            }

            if waiter.is_none() {
                waiter = Some(WaiterGuard::new(self.shared.clone()));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "timed out waiting for a connection");
                return Err(PoolError::Timeout(timeout));
            }
        }
    }

    /// One pass over the state under the lock
    async fn try_acquire(&self, deadline: Instant) -> Result<Attempt, PoolError> {
        let config = &self.shared.config;
        let (attempt, expired) = {
            let mut state = self.shared.state.lock();
            if state.is_closed() {
                return Err(PoolError::PoolClosed);
            }

            let lookup = state.take_idle(Instant::now(), config.max_idle());
            let attempt = match lookup.found {
                Some((id, connection)) => {
                    Attempt::Ready(PooledConnection::new(id, connection, self.shared.clone()))
                }
                None if state.has_capacity(config.max_size()) => {
                    state.reserve_slot();
                    Attempt::Open(SlotReservation::new(self.shared.clone()))
                }
                None => Attempt::Exhausted,
            };
            (attempt, lookup.expired)
        };

        if !expired.is_empty() {
            // Eviction may have freed capacity another waiter can use.
            self.shared.released.notify_waiters();
            let count = expired.len();
            if tokio::time::timeout_at(deadline, close_connections(expired)).await.is_err() {
                tracing::warn!(expired = count, "gave up closing expired connections at acquire deadline");
            }
        }

        if let Attempt::Ready(conn) = &attempt {
            tracing::debug!(connection = %conn.id(), "reusing idle connection");
        }
        Ok(attempt)
    }

    /// Open a connection into a reserved slot, giving up at `deadline`
    async fn open_connection(
        &self,
        slot: SlotReservation,
        deadline: Instant,
    ) -> Result<PooledConnection, PoolError> {
        let created = match tokio::time::timeout_at(deadline, self.shared.factory.create()).await {
            Ok(created) => created,
            Err(_) => {
                let timeout = self.shared.config.acquire_timeout();
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "timed out opening a connection");
                drop(slot);
                return Err(PoolError::Timeout(timeout));
            }
        };
        let connection = match created {
            Ok(connection) => connection,
            Err(e) => {
                tracing::error!(error = %e, "failed to open connection");
                drop(slot);
                return Err(PoolError::Connection(e));
            }
        };

        let id = {
            let mut state = self.shared.state.lock();
            if state.is_closed() {
                slot.abandon(&mut state);
                None
            } else {
                Some(slot.fill(&mut state, connection.clone()))
            }
        };

        match id {
            Some(id) => {
                tracing::debug!(connection = %id, "opened new connection");
                Ok(PooledConnection::new(id, connection, self.shared.clone()))
            }
            None => {
                close_connections(vec![connection]).await;
                Err(PoolError::PoolClosed)
            }
        }
    }

    /// Return a connection to the pool
    ///
    /// Fails with [`PoolError::InvalidRelease`] when the connection was not
    /// checked out from this pool; the pool's counts are left untouched and
    /// the handle goes back to the pool it came from when dropped.
    pub fn release(&self, mut conn: PooledConnection) -> Result<(), PoolError> {
        if !Arc::ptr_eq(&self.shared, &conn.pool) {
            tracing::warn!(connection = %conn.id, "release of a connection owned by another pool");
            return Err(PoolError::InvalidRelease);
        }
        conn.returned = true;
        let result = self.shared.check_in(conn.id);
        if let Err(e) = &result {
            tracing::warn!(connection = %conn.id, error = %e, "release rejected");
        }
        result
    }

    /// Close every connection and refuse further acquisitions
    ///
    /// Idle and checked-out connections alike are closed, and callers
    /// blocked in [`ConnectionPool::acquire`] fail with
    /// [`PoolError::PoolClosed`]. Calling this again is a no-op. Returns the
    /// number of connections closed by this call.
    pub async fn close_all(&self) -> usize {
        let (drained, was_open) = {
            let mut state = self.shared.state.lock();
            let was_open = !state.is_closed();
            (state.shut_down(), was_open)
        };
        self.shared.released.notify_waiters();

        let count = drained.len();
        close_connections(drained).await;
        if was_open {
            tracing::info!(closed = count, "connection pool closed");
        }
        count
    }

    /// Whether [`ConnectionPool::close_all`] has been called
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().is_closed()
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats::new(
            state.active_count(),
            state.idle_count(),
            state.in_use_count(),
            state.waiting(),
        )
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    #[cfg(test)]
    pub(crate) fn invariants_hold(&self) -> bool {
        self.shared
            .state
            .lock()
            .invariants_hold(self.shared.config.max_size())
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Close connections outside the pool lock, logging failures
async fn close_connections(connections: Vec<Arc<dyn Connection>>) {
    for conn in connections {
        if let Err(e) = conn.close().await {
            tracing::warn!(error = %e, "failed to close connection");
        }
    }
}

/// A capacity slot held while the factory runs
///
/// Dropping an unfilled reservation gives the slot back, which keeps the
/// count right when an `acquire` future is cancelled mid-connect.
struct SlotReservation {
    shared: Arc<PoolShared>,
    armed: bool,
}

impl SlotReservation {
    fn new(shared: Arc<PoolShared>) -> Self {
        Self {
            shared,
            armed: true,
        }
    }

    fn fill(mut self, state: &mut PoolState, connection: Arc<dyn Connection>) -> ConnectionId {
        self.armed = false;
        state.fill_slot(connection)
    }

    fn abandon(mut self, state: &mut PoolState) {
        self.armed = false;
        state.cancel_slot();
    }
}

impl Drop for SlotReservation {
    fn drop(&mut self) {
        if self.armed {
            self.shared.state.lock().cancel_slot();
            self.shared.released.notify_waiters();
        }
    }
}

/// Counts a caller as waiting for as long as it lives
struct WaiterGuard {
    shared: Arc<PoolShared>,
}

impl WaiterGuard {
    fn new(shared: Arc<PoolShared>) -> Self {
        shared.state.lock().add_waiter();
        Self { shared }
    }
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        self.shared.state.lock().remove_waiter();
    }
}

/// A connection checked out from the pool
///
/// Derefs to the underlying [`Connection`]. Give it back with
/// [`ConnectionPool::release`]; if it is dropped instead, it returns to the
/// pool on its own. Callers must never close it directly.
pub struct PooledConnection {
    id: ConnectionId,
    connection: Arc<dyn Connection>,
    pool: Arc<PoolShared>,
    returned: bool,
}

impl PooledConnection {
    fn new(id: ConnectionId, connection: Arc<dyn Connection>, pool: Arc<PoolShared>) -> Self {
        Self {
            id,
            connection,
            pool,
            returned: false,
        }
    }

    /// Get the pool-assigned id of this connection
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Get the underlying connection as an Arc
    pub fn inner(&self) -> &Arc<dyn Connection> {
        &self.connection
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.connection.as_ref()
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("driver", &self.connection.driver_name())
            .finish()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if self.returned {
            return;
        }
        if let Err(e) = self.pool.check_in(self.id) {
            tracing::debug!(connection = %self.id, error = %e, "dropped connection not returned to pool");
        }
    }
}
