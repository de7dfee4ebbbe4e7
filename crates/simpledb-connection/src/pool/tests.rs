//! Tests for connection pool functionality

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use simpledb_core::{Connection, DbError, QueryResult, Result, StatementResult, Value};
use tokio::time::Instant;

use super::config::PoolConfig;
use super::error::PoolError;
use super::factory::ConnectionFactory;
use super::pool::ConnectionPool;
use super::stats::PoolStats;

fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .finish();

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Mock connection for testing
struct MockConnection {
    #[allow(dead_code)]
    id: usize,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl MockConnection {
    fn new(id: usize) -> Self {
        Self {
            id,
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
        }
    }

    fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn execute(&self, _sql: &str, _params: &[Value]) -> Result<StatementResult> {
        Ok(StatementResult::default())
    }

    async fn query(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult> {
        Ok(QueryResult::empty())
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Mock factory that records every connection it opens
#[derive(Default)]
struct MockConnectionFactory {
    counter: AtomicUsize,
    failing: AtomicBool,
    fail_after: Mutex<Option<usize>>,
    delay_ms: AtomicU64,
    created: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockConnectionFactory {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Succeed for the first `n` creates, then fail
    fn failing_after(n: usize) -> Arc<Self> {
        let factory = Self::default();
        *factory.fail_after.lock() = Some(n);
        Arc::new(factory)
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    fn count(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }

    fn connection(&self, index: usize) -> Arc<MockConnection> {
        self.created.lock()[index].clone()
    }
}

#[async_trait]
impl ConnectionFactory for MockConnectionFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let exhausted = matches!(*self.fail_after.lock(), Some(n) if self.count() >= n);
        if exhausted || self.failing.load(Ordering::SeqCst) {
            return Err(DbError::Connection("backend unreachable".into()));
        }
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        let conn = Arc::new(MockConnection::new(id));
        self.created.lock().push(conn.clone());
        Ok(conn)
    }
}

async fn pool_with(config: PoolConfig) -> (ConnectionPool, Arc<MockConnectionFactory>) {
    init_test_logging();
    let factory = MockConnectionFactory::new();
    let pool = ConnectionPool::new(config, factory.clone())
        .await
        .expect("create pool");
    (pool, factory)
}

// =============================================================================
// PoolConfig tests
// =============================================================================

#[test]
fn test_pool_config_creation() {
    let config = PoolConfig::new(2, 10);
    assert_eq!(config.min_size(), 2);
    assert_eq!(config.max_size(), 10);
    assert_eq!(config.acquire_timeout(), Duration::from_millis(5_000));
    assert_eq!(config.max_idle(), Duration::from_millis(30_000));
    assert!(config.validate().is_ok());
}

#[test]
fn test_pool_config_with_timeouts() {
    let config = PoolConfig::new(1, 5)
        .with_acquire_timeout_ms(250)
        .with_max_idle_ms(60_000);

    assert_eq!(config.acquire_timeout(), Duration::from_millis(250));
    assert_eq!(config.max_idle(), Duration::from_millis(60_000));

    let resized = config.with_max_size(3).with_min_size(4);
    assert_eq!(resized.max_size(), 3);
    assert!(resized.validate().is_err());
}

#[test]
fn test_pool_config_default() {
    let config = PoolConfig::default();
    assert_eq!(config.min_size(), 1);
    assert_eq!(config.max_size(), 2);
}

#[test]
fn test_pool_config_validation() {
    let err = PoolConfig::new(0, 0).validate().unwrap_err();
    assert!(err.to_string().contains("max_size must be greater than 0"));

    let err = PoolConfig::new(10, 5).validate().unwrap_err();
    assert!(err.to_string().contains("min_size (10) cannot exceed max_size (5)"));

    let err = PoolConfig::new(1, 5)
        .with_acquire_timeout_ms(0)
        .validate()
        .unwrap_err();
    assert!(matches!(err, PoolError::InvalidConfig(_)));

    assert!(PoolConfig::new(0, 1).validate().is_ok());
}

#[test]
fn test_pool_config_partial_toml() {
    let config: PoolConfig = toml::from_str("max_size = 4\nmax_idle_ms = 1000").expect("parse");
    assert_eq!(config.min_size(), 1);
    assert_eq!(config.max_size(), 4);
    assert_eq!(config.acquire_timeout(), Duration::from_millis(5_000));
    assert_eq!(config.max_idle(), Duration::from_millis(1_000));
}

#[test]
fn test_pool_config_serialization() {
    let config = PoolConfig::new(2, 10).with_acquire_timeout_ms(5000);
    let json = serde_json::to_string(&config).expect("serialize");
    let deserialized: PoolConfig = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(deserialized, config);
}

// =============================================================================
// PoolStats tests
// =============================================================================

#[test]
fn test_pool_stats_contention() {
    assert!(!PoolStats::default().has_contention());
    assert!(!PoolStats::new(2, 1, 1, 3).has_contention());
    assert!(PoolStats::new(2, 0, 2, 1).has_contention());
    assert!(!PoolStats::new(2, 0, 2, 0).has_contention());
}

// =============================================================================
// Construction
// =============================================================================

#[tokio::test]
async fn test_pool_prewarms_min_size() {
    let (pool, factory) = pool_with(PoolConfig::new(2, 4)).await;
    assert_eq!(factory.count(), 2);
    assert_eq!(pool.stats(), PoolStats::new(2, 2, 0, 0));

    let _conn = pool.acquire().await.expect("acquire");
    assert_eq!(factory.count(), 2, "pre-warmed connection should be reused");
    assert_eq!(pool.stats(), PoolStats::new(2, 1, 1, 0));
    assert!(pool.invariants_hold());
}

#[tokio::test]
async fn test_pool_prewarm_failure_closes_opened_connections() {
    init_test_logging();
    let factory = MockConnectionFactory::failing_after(2);
    let result = ConnectionPool::new(PoolConfig::new(3, 4), factory.clone()).await;

    assert!(matches!(result, Err(PoolError::Connection(_))));
    assert_eq!(factory.count(), 2);
    assert!(factory.connection(0).is_closed());
    assert!(factory.connection(1).is_closed());
}

#[tokio::test]
async fn test_pool_rejects_invalid_config() {
    init_test_logging();
    let factory = MockConnectionFactory::new();
    let result = ConnectionPool::new(PoolConfig::new(3, 2), factory.clone()).await;

    assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
    assert_eq!(factory.count(), 0);
}

// =============================================================================
// Acquire / release
// =============================================================================

#[tokio::test]
async fn test_pool_release_and_reuse() {
    let (pool, factory) = pool_with(PoolConfig::new(0, 5)).await;

    let conn = pool.acquire().await.expect("acquire");
    assert_eq!(conn.driver_name(), "mock");
    let first_id = conn.id();
    assert_eq!(pool.stats(), PoolStats::new(1, 0, 1, 0));

    pool.release(conn).expect("release");
    assert_eq!(pool.stats(), PoolStats::new(1, 1, 0, 0));

    let conn = pool.acquire().await.expect("acquire again");
    assert_eq!(conn.id(), first_id);
    assert_eq!(factory.count(), 1);
    assert!(pool.invariants_hold());
}

#[tokio::test]
async fn test_pool_dropped_connection_returns_to_pool() {
    let (pool, factory) = pool_with(PoolConfig::new(0, 1)).await;

    {
        let _conn = pool.acquire().await.expect("acquire");
        assert_eq!(pool.stats().in_use(), 1);
    }

    assert_eq!(pool.stats(), PoolStats::new(1, 1, 0, 0));
    let _conn = pool.acquire().await.expect("acquire after drop");
    assert_eq!(factory.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pool_waiter_resumes_after_release() {
    let (pool, _factory) = pool_with(PoolConfig::new(0, 1).with_acquire_timeout_ms(5_000)).await;

    let held = pool.acquire().await.expect("first acquire");
    let held_id = held.id();

    let waiter_pool = pool.clone();
    let waiter = tokio::spawn(async move { waiter_pool.acquire().await });

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert!(!waiter.is_finished(), "second acquire must block while at capacity");
    assert_eq!(pool.stats().waiting(), 1);

    let released_at = Instant::now();
    pool.release(held).expect("release");

    let conn = waiter.await.expect("join").expect("second acquire");
    assert_eq!(conn.id(), held_id);
    assert!(released_at.elapsed() < pool.config().acquire_timeout());
    assert_eq!(pool.stats().waiting(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_pool_acquire_times_out_at_capacity() {
    let (pool, factory) = pool_with(PoolConfig::new(1, 1).with_acquire_timeout_ms(2_000)).await;

    let _held = pool.acquire().await.expect("first acquire");

    let start = Instant::now();
    let err = pool.acquire().await.unwrap_err();
    let waited = start.elapsed();

    assert!(matches!(err, PoolError::Timeout(t) if t == Duration::from_millis(2_000)));
    assert!(err.is_recoverable());
    assert!(err.to_string().contains("Timed out"));
    assert!(waited >= Duration::from_millis(2_000));
    assert!(waited < Duration::from_millis(2_100));

    assert_eq!(factory.count(), 1);
    assert_eq!(pool.stats(), PoolStats::new(1, 0, 1, 0));
    assert!(pool.invariants_hold());
}

#[tokio::test(start_paused = true)]
async fn test_pool_cancelled_acquire_leaves_no_waiter() {
    let (pool, _factory) = pool_with(PoolConfig::new(0, 1)).await;
    let held = pool.acquire().await.expect("acquire");

    let attempt = tokio::time::timeout(Duration::from_millis(100), pool.acquire()).await;
    assert!(attempt.is_err(), "acquire should still be pending");
    assert_eq!(pool.stats().waiting(), 0);

    pool.release(held).expect("release");
    pool.acquire().await.expect("acquire after cancelled waiter");
}

#[tokio::test(start_paused = true)]
async fn test_pool_cancelled_connect_returns_capacity() {
    let (pool, factory) = pool_with(PoolConfig::new(0, 1)).await;
    factory.set_delay(Duration::from_millis(500));

    let attempt = tokio::time::timeout(Duration::from_millis(100), pool.acquire()).await;
    assert!(attempt.is_err(), "connect should still be running");
    assert_eq!(pool.stats().total(), 0);
    assert!(pool.invariants_hold());

    factory.set_delay(Duration::ZERO);
    pool.acquire()
        .await
        .expect("slot of the cancelled connect should be free again");
}

#[tokio::test]
async fn test_pool_factory_failure_surfaces_immediately() {
    let (pool, factory) = pool_with(PoolConfig::new(0, 1)).await;
    factory.set_failing(true);

    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, PoolError::Connection(DbError::Connection(_))));
    assert!(!err.is_recoverable());
    assert_eq!(pool.stats().total(), 0);
    assert!(pool.invariants_hold());

    factory.set_failing(false);
    pool.acquire().await.expect("capacity must be available after a failed connect");
}

#[tokio::test]
async fn test_pool_release_to_foreign_pool_is_rejected() {
    let (pool_a, _) = pool_with(PoolConfig::new(1, 2)).await;
    let (pool_b, _) = pool_with(PoolConfig::new(0, 2)).await;

    let before = pool_a.stats();
    let foreign = pool_b.acquire().await.expect("acquire from b");

    let err = pool_a.release(foreign).unwrap_err();
    assert!(matches!(err, PoolError::InvalidRelease));
    assert_eq!(pool_a.stats(), before);

    // The rejected handle went back to the pool it came from.
    assert_eq!(pool_b.stats(), PoolStats::new(1, 1, 0, 0));
}

#[tokio::test]
async fn test_pool_discards_connection_closed_by_caller() {
    let (pool, factory) = pool_with(PoolConfig::new(0, 2)).await;

    let conn = pool.acquire().await.expect("acquire");
    conn.close().await.expect("close");
    pool.release(conn).expect("release");

    assert_eq!(pool.stats().total(), 0);
    let _fresh = pool.acquire().await.expect("acquire");
    assert_eq!(factory.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_pool_slow_connect_is_bounded_by_acquire_timeout() {
    let (pool, factory) = pool_with(PoolConfig::new(0, 1).with_acquire_timeout_ms(1_000)).await;
    factory.set_delay(Duration::from_secs(10));

    let start = Instant::now();
    let err = pool.acquire().await.unwrap_err();
    let waited = start.elapsed();

    assert!(matches!(err, PoolError::Timeout(t) if t == Duration::from_millis(1_000)));
    assert!(waited >= Duration::from_millis(1_000));
    assert!(waited < Duration::from_millis(1_100));
    assert_eq!(pool.stats().total(), 0);
    assert!(pool.invariants_hold());

    factory.set_delay(Duration::ZERO);
    pool.acquire().await.expect("slot of the timed-out connect is free again");
}

#[tokio::test(start_paused = true)]
async fn test_pool_woken_waiter_connect_uses_remaining_budget() {
    let (pool, factory) = pool_with(PoolConfig::new(0, 1).with_acquire_timeout_ms(1_000)).await;
    let held = pool.acquire().await.expect("first acquire");

    let start = Instant::now();
    let waiter_pool = pool.clone();
    let waiter = tokio::spawn(async move { waiter_pool.acquire().await });

    tokio::time::sleep(Duration::from_millis(900)).await;
    assert!(!waiter.is_finished());

    // The released connection is closed, so the waiter has to open a new one.
    factory.set_delay(Duration::from_secs(5));
    held.close().await.expect("close");
    pool.release(held).expect("release");

    let err = waiter.await.expect("join").unwrap_err();
    assert!(matches!(err, PoolError::Timeout(_)));
    assert!(start.elapsed() < Duration::from_millis(1_100));
    assert_eq!(pool.stats(), PoolStats::new(0, 0, 0, 0));
    assert!(pool.invariants_hold());
}

// =============================================================================
// Idle eviction
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_pool_evicts_expired_idle_connection() {
    let (pool, factory) = pool_with(PoolConfig::new(1, 2).with_max_idle_ms(1_000)).await;
    let stale = factory.connection(0);

    tokio::time::sleep(Duration::from_millis(1_500)).await;

    let _conn = pool.acquire().await.expect("acquire");
    assert!(stale.is_closed(), "expired connection should be closed");
    assert_eq!(factory.count(), 2, "a fresh connection replaces the expired one");
    assert_eq!(pool.stats(), PoolStats::new(1, 0, 1, 0));
    assert!(pool.invariants_hold());
}

#[tokio::test(start_paused = true)]
async fn test_pool_keeps_recently_idle_connection() {
    let (pool, factory) = pool_with(PoolConfig::new(1, 2).with_max_idle_ms(1_000)).await;

    tokio::time::sleep(Duration::from_millis(500)).await;

    let _conn = pool.acquire().await.expect("acquire");
    assert!(!factory.connection(0).is_closed());
    assert_eq!(factory.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pool_release_restarts_idle_clock() {
    let (pool, factory) = pool_with(PoolConfig::new(1, 1).with_max_idle_ms(1_000)).await;

    tokio::time::sleep(Duration::from_millis(800)).await;
    let conn = pool.acquire().await.expect("acquire");
    tokio::time::sleep(Duration::from_millis(800)).await;
    pool.release(conn).expect("release");
    tokio::time::sleep(Duration::from_millis(800)).await;

    let _conn = pool.acquire().await.expect("acquire again");
    assert_eq!(factory.count(), 1, "idle time counts from the last release");
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test]
async fn test_pool_close_all() {
    let (pool, factory) = pool_with(PoolConfig::new(2, 3)).await;
    let held = pool.acquire().await.expect("acquire");

    assert_eq!(pool.close_all().await, 2);
    assert!(pool.is_closed());
    assert_eq!(pool.stats(), PoolStats::default());
    assert!(held.is_closed(), "checked-out connections are closed too");

    assert!(matches!(pool.acquire().await, Err(PoolError::PoolClosed)));
    assert!(matches!(pool.release(held), Err(PoolError::PoolClosed)));

    assert_eq!(pool.close_all().await, 0);
    for index in 0..factory.count() {
        assert_eq!(factory.connection(index).close_calls(), 1);
    }
}

#[tokio::test]
async fn test_pool_drop_after_close_is_harmless() {
    let (pool, _factory) = pool_with(PoolConfig::new(0, 1)).await;
    let held = pool.acquire().await.expect("acquire");

    pool.close_all().await;
    drop(held);

    assert_eq!(pool.stats(), PoolStats::default());
}

#[tokio::test(start_paused = true)]
async fn test_pool_close_all_wakes_waiters() {
    let (pool, _factory) = pool_with(PoolConfig::new(0, 1).with_acquire_timeout_ms(10_000)).await;
    let _held = pool.acquire().await.expect("acquire");

    let waiter_pool = pool.clone();
    let waiter = tokio::spawn(async move { waiter_pool.acquire().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let start = Instant::now();
    pool.close_all().await;

    let result = waiter.await.expect("join");
    assert!(matches!(result, Err(PoolError::PoolClosed)));
    assert!(start.elapsed() < Duration::from_millis(10_000));
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_concurrent_checkouts_are_exclusive() {
    let (pool, factory) = pool_with(PoolConfig::new(1, 3).with_acquire_timeout_ms(10_000)).await;
    let checked_out = Arc::new(Mutex::new(HashSet::new()));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let pool = pool.clone();
            let checked_out = checked_out.clone();
            tokio::spawn(async move {
                for _ in 0..10 {
                    let conn = pool.acquire().await.expect("acquire");
                    assert!(
                        checked_out.lock().insert(conn.id()),
                        "connection handed to two callers"
                    );
                    assert!(pool.invariants_hold());
                    assert!(pool.stats().total() <= 3);
                    tokio::task::yield_now().await;
                    checked_out.lock().remove(&conn.id());
                    pool.release(conn).expect("release");
                }
            })
        })
        .collect();

    for result in futures::future::join_all(tasks).await {
        result.expect("task panicked");
    }

    assert!(factory.count() <= 3);
    assert!(pool.invariants_hold());
    assert_eq!(pool.stats().in_use(), 0);
    assert_eq!(pool.stats().waiting(), 0);
}
