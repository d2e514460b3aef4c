// crates/reservation-gate-store-postgres/src/pool.rs
// ============================================================================
// Module: Connection Pool Manager
// Description: Lazily constructed, process-shared bounded connection pool.
// Purpose: Build the pool exactly once and bound concurrent database access.
// Dependencies: r2d2, tokio, tracing
// ============================================================================

//! ## Overview
//! [`ConnectionPoolManager`] owns one r2d2 pool per manager instance. The pool
//! is created on first use through [`tokio::sync::OnceCell`], so concurrent
//! first callers all observe the same instance and the connection factory
//! runs once. Checkout and statement execution happen on blocking workers;
//! connections return to the pool on every exit path because the r2d2 guard
//! is dropped inside the worker closure.
//!
//! ## Invariants
//! - At most one pool is constructed per manager.
//! - At most `pool_size + max_overflow` connections are open at once.
//! - A checkout waits at most `acquire_timeout_ms` before failing.
//! - Once the pool is saturated, at most `max_waiters` callers queue for a
//!   connection; further callers fail fast with [`PoolError::Exhausted`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::SystemTime;

use r2d2::ManageConnection;
use r2d2::Pool;
use r2d2::PooledConnection;
use reservation_gate_core::RepositoryError;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::Instrument;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default number of persistent connections.
pub const DEFAULT_POOL_SIZE: u32 = 5;
/// Default number of burst connections above `pool_size`.
pub const DEFAULT_MAX_OVERFLOW: u32 = 2;
/// Default checkout timeout in milliseconds.
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 30_000;
/// Default maximum connection age in seconds before recycling.
pub const DEFAULT_RECYCLE_SECS: u64 = 1_800;
/// Default idle timeout for connections above `pool_size`.
pub const DEFAULT_OVERFLOW_IDLE_TIMEOUT_MS: u64 = 60_000;
/// Default bound on callers queued behind a saturated pool.
pub const DEFAULT_MAX_WAITERS: usize = 64;
/// Hard ceiling on `pool_size + max_overflow`.
pub const MAX_POOL_CONNECTIONS: u32 = 1_024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Connection pool errors.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Pool configuration is invalid.
    #[error("invalid pool config: {0}")]
    Config(String),
    /// Connection manager could not be created.
    #[error("pool initialization failed: {0}")]
    Init(String),
    /// Pool is saturated and the waiter queue is full.
    #[error("connection pool exhausted ({max_waiters} waiters queued)")]
    Exhausted {
        /// Configured waiter bound.
        max_waiters: usize,
    },
    /// Checkout exceeded the configured timeout.
    #[error("connection pool timeout after {timeout_ms} ms: {detail}")]
    Timeout {
        /// Configured acquisition timeout in milliseconds.
        timeout_ms: u64,
        /// r2d2 detail, usually the last connection error.
        detail: String,
    },
    /// Blocking worker panicked or was cancelled.
    #[error("pool worker failed: {0}")]
    Worker(String),
}

impl From<PoolError> for RepositoryError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Exhausted {
                max_waiters,
            } => Self::PoolExhausted {
                max_waiters,
            },
            PoolError::Timeout {
                timeout_ms,
                detail,
            } => Self::PoolTimeout {
                timeout_ms,
                detail,
            },
            other @ (PoolError::Config(_) | PoolError::Init(_) | PoolError::Worker(_)) => {
                Self::Database(other.to_string())
            }
        }
    }
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Pool sizing and timeout configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Persistent connections kept open.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// Additional burst connections.
    #[serde(default = "default_max_overflow")]
    pub max_overflow: u32,
    /// Checkout timeout in milliseconds.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    /// Maximum connection age in seconds.
    #[serde(default = "default_recycle_secs")]
    pub recycle_secs: u64,
    /// Idle timeout for burst connections in milliseconds.
    #[serde(default = "default_overflow_idle_timeout_ms")]
    pub overflow_idle_timeout_ms: u64,
    /// Maximum callers queued behind a saturated pool.
    #[serde(default = "default_max_waiters")]
    pub max_waiters: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            max_overflow: DEFAULT_MAX_OVERFLOW,
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
            recycle_secs: DEFAULT_RECYCLE_SECS,
            overflow_idle_timeout_ms: DEFAULT_OVERFLOW_IDLE_TIMEOUT_MS,
            max_waiters: DEFAULT_MAX_WAITERS,
        }
    }
}

impl PoolConfig {
    /// Validates sizing and timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Config`] when any bound is zero or the total
    /// connection count exceeds [`MAX_POOL_CONNECTIONS`].
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.pool_size == 0 {
            return Err(PoolError::Config("pool_size must be greater than zero".to_string()));
        }
        let total = self
            .pool_size
            .checked_add(self.max_overflow)
            .filter(|total| *total <= MAX_POOL_CONNECTIONS);
        if total.is_none() {
            return Err(PoolError::Config(format!(
                "pool_size + max_overflow must not exceed {MAX_POOL_CONNECTIONS}"
            )));
        }
        if self.acquire_timeout_ms == 0 {
            return Err(PoolError::Config(
                "acquire_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.recycle_secs == 0 {
            return Err(PoolError::Config("recycle_secs must be greater than zero".to_string()));
        }
        if self.overflow_idle_timeout_ms == 0 {
            return Err(PoolError::Config(
                "overflow_idle_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the maximum number of simultaneously open connections.
    #[must_use]
    pub const fn max_connections(&self) -> u32 {
        self.pool_size.saturating_add(self.max_overflow)
    }

    /// Returns the checkout timeout.
    #[must_use]
    pub const fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Returns the maximum connection age.
    #[must_use]
    pub const fn recycle_age(&self) -> Duration {
        Duration::from_secs(self.recycle_secs)
    }

    /// Returns the idle timeout applied to burst connections.
    #[must_use]
    pub const fn overflow_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.overflow_idle_timeout_ms)
    }
}

/// Default for [`PoolConfig::pool_size`].
const fn default_pool_size() -> u32 {
    DEFAULT_POOL_SIZE
}

/// Default for [`PoolConfig::max_overflow`].
const fn default_max_overflow() -> u32 {
    DEFAULT_MAX_OVERFLOW
}

/// Default for [`PoolConfig::acquire_timeout_ms`].
const fn default_acquire_timeout_ms() -> u64 {
    DEFAULT_ACQUIRE_TIMEOUT_MS
}

/// Default for [`PoolConfig::recycle_secs`].
const fn default_recycle_secs() -> u64 {
    DEFAULT_RECYCLE_SECS
}

/// Default for [`PoolConfig::overflow_idle_timeout_ms`].
const fn default_overflow_idle_timeout_ms() -> u64 {
    DEFAULT_OVERFLOW_IDLE_TIMEOUT_MS
}

/// Default for [`PoolConfig::max_waiters`].
const fn default_max_waiters() -> usize {
    DEFAULT_MAX_WAITERS
}

// ============================================================================
// SECTION: Shared Pool
// ============================================================================

/// Point-in-time pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Open connections, idle or checked out.
    pub connections: u32,
    /// Idle connections available for checkout.
    pub idle_connections: u32,
    /// Maximum open connections.
    pub max_size: u32,
    /// Pool creation time.
    pub created_at: SystemTime,
}

/// The single pool instance shared by all callers of a manager.
pub struct SharedPool<M: ManageConnection> {
    /// Underlying r2d2 pool.
    pool: Pool<M>,
    /// Checkout timeout.
    acquire_timeout: Duration,
    /// Checkout timeout in milliseconds, for error reporting.
    acquire_timeout_ms: u64,
    /// Pool creation time.
    created_at: SystemTime,
}

impl<M: ManageConnection> SharedPool<M> {
    /// Checks out a connection, blocking up to the acquisition timeout.
    ///
    /// Must be called from a blocking context.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Timeout`] when no connection becomes available.
    pub fn checkout(&self) -> Result<PooledConnection<M>, PoolError> {
        self.pool.get_timeout(self.acquire_timeout).map_err(|err| PoolError::Timeout {
            timeout_ms: self.acquire_timeout_ms,
            detail: err.to_string(),
        })
    }

    /// Returns current pool occupancy.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.pool.state();
        PoolStatus {
            connections: state.connections,
            idle_connections: state.idle_connections,
            max_size: self.pool.max_size(),
            created_at: self.created_at,
        }
    }

    /// Returns true when every connection is checked out and no more can open.
    fn is_saturated(&self) -> bool {
        let state = self.pool.state();
        state.idle_connections == 0 && state.connections >= self.pool.max_size()
    }
}

// ============================================================================
// SECTION: Manager
// ============================================================================

/// Factory producing the connection manager when the pool is first built.
type ManagerFactory<M> = Box<dyn Fn() -> Result<M, PoolError> + Send + Sync>;

/// Lazily constructed, bounded connection pool.
///
/// # Invariants
/// - The factory runs at most once per successful initialization.
/// - A failed initialization leaves the manager uninitialized so the next
///   caller retries.
pub struct ConnectionPoolManager<M: ManageConnection> {
    /// Pool sizing and timeouts.
    config: PoolConfig,
    /// Connection manager factory.
    factory: ManagerFactory<M>,
    /// Lazily initialized pool.
    pool: OnceCell<Arc<SharedPool<M>>>,
    /// Number of pools constructed.
    constructions: AtomicUsize,
    /// Callers currently waiting on or holding a checkout slot.
    waiters: Arc<AtomicUsize>,
}

impl<M: ManageConnection> ConnectionPoolManager<M> {
    /// Creates a manager without opening any connection.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Config`] when `config` is invalid.
    pub fn new<F>(config: PoolConfig, factory: F) -> Result<Self, PoolError>
    where
        F: Fn() -> Result<M, PoolError> + Send + Sync + 'static,
    {
        config.validate()?;
        Ok(Self {
            config,
            factory: Box::new(factory),
            pool: OnceCell::new(),
            constructions: AtomicUsize::new(0),
            waiters: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Returns the pool configuration.
    #[must_use]
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Returns true once the pool has been constructed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.pool.initialized()
    }

    /// Returns the number of pools constructed by this manager.
    #[must_use]
    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }

    /// Returns pool occupancy, or `None` before first use.
    #[must_use]
    pub fn status(&self) -> Option<PoolStatus> {
        self.pool.get().map(|shared| shared.status())
    }

    /// Returns the shared pool, constructing it on first call.
    ///
    /// Concurrent first callers wait on the same initialization and all
    /// receive the same instance.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Init`] when the connection manager cannot be built.
    pub async fn acquire_pool(&self) -> Result<Arc<SharedPool<M>>, PoolError> {
        let shared = self.pool.get_or_try_init(|| async { self.build_pool() }).await?;
        Ok(Arc::clone(shared))
    }

    /// Checks out a connection without running a statement.
    ///
    /// The returned guard releases the connection when dropped.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError`] on initialization failure, exhaustion, or timeout.
    pub async fn acquire_connection(&self) -> Result<PooledConnection<M>, PoolError> {
        let shared = self.acquire_pool().instrument(tracing::info_span!("get-engine")).await?;
        let admission = self.admit(&shared)?;
        let span = tracing::info_span!("pool-connect");
        let handle = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            let checkout = shared.checkout();
            drop(admission);
            checkout
        });
        handle.await.map_err(|err| PoolError::Worker(err.to_string()))?
    }

    /// Runs `operation` against a pooled connection on a blocking worker.
    ///
    /// The connection is released when `operation` returns, fails, or panics.
    ///
    /// # Errors
    ///
    /// Returns pool failures converted into `E`, or the error produced by
    /// `operation`.
    pub async fn run<T, E, F>(&self, operation: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<PoolError> + Send + 'static,
        F: FnOnce(&mut M::Connection) -> Result<T, E> + Send + 'static,
    {
        let shared = self.acquire_pool().instrument(tracing::info_span!("get-engine")).await?;
        let admission = self.admit(&shared)?;
        let connect_span = tracing::info_span!("pool-connect");
        let handle = tokio::task::spawn_blocking(move || {
            let mut connection = {
                let _entered = connect_span.enter();
                let checkout = shared.checkout();
                drop(admission);
                checkout?
            };
            let execute_span = tracing::info_span!(parent: &connect_span, "pool-execute");
            let _entered = execute_span.enter();
            operation(&mut connection)
        });
        handle.await.map_err(|err| E::from(PoolError::Worker(err.to_string())))?
    }

    /// Builds the pool. Called at most once per successful initialization.
    fn build_pool(&self) -> Result<Arc<SharedPool<M>>, PoolError> {
        let manager = (self.factory)()?;
        let pool = Pool::builder()
            .max_size(self.config.max_connections())
            .min_idle(Some(self.config.pool_size))
            .max_lifetime(Some(self.config.recycle_age()))
            .idle_timeout(Some(self.config.overflow_idle_timeout()))
            .connection_timeout(self.config.acquire_timeout())
            .build_unchecked(manager);
        self.constructions.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            pool_size = self.config.pool_size,
            max_overflow = self.config.max_overflow,
            acquire_timeout_ms = self.config.acquire_timeout_ms,
            "connection pool created"
        );
        Ok(Arc::new(SharedPool {
            pool,
            acquire_timeout: self.config.acquire_timeout(),
            acquire_timeout_ms: self.config.acquire_timeout_ms,
            created_at: SystemTime::now(),
        }))
    }

    /// Reserves a waiter slot, failing fast when the saturated pool's queue
    /// is full.
    fn admit(&self, shared: &SharedPool<M>) -> Result<WaiterGuard, PoolError> {
        let queued = self.waiters.fetch_add(1, Ordering::SeqCst);
        let guard = WaiterGuard {
            counter: Arc::clone(&self.waiters),
        };
        if queued >= self.config.max_waiters && shared.is_saturated() {
            drop(guard);
            tracing::warn!(max_waiters = self.config.max_waiters, "connection pool exhausted");
            return Err(PoolError::Exhausted {
                max_waiters: self.config.max_waiters,
            });
        }
        Ok(guard)
    }
}

impl<M: ManageConnection> Drop for ConnectionPoolManager<M> {
    fn drop(&mut self) {
        // Driver clients may block on close; never drop them on a runtime thread.
        if let Some(shared) = self.pool.take() {
            let _ = std::thread::spawn(move || drop(shared));
        }
    }
}

/// Releases a waiter slot on drop.
struct WaiterGuard {
    /// Shared waiter counter.
    counter: Arc<AtomicUsize>,
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}
