//! Fixed-size SQLite connection pool.
//!
//! # Responsibility
//! - Open every connection of one store eagerly at startup.
//! - Hand out connections with a bounded wait and take them back on drop.
//! - Track pool health independently of every other pool.
//!
//! # Invariants
//! - A pool never opens more than `size` live connections.
//! - A `PooledConnection` always returns to its own pool, including during
//!   panic unwinding; connections returned after `close()` are dropped.
//! - Pool state is guarded internally; callers never hold external locks.

use super::{open_store, AccessMode, DbError, StoreLocation};
use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex};
use rusqlite::Connection;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub type PoolResult<T> = Result<T, PoolError>;

/// Static pool parameters, fixed for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub name: String,
    pub location: StoreLocation,
    pub access: AccessMode,
    pub size: u32,
    pub acquire_timeout: Duration,
}

#[derive(Debug)]
pub enum PoolError {
    Timeout { pool: String, waited: Duration },
    Closed { pool: String },
    Unhealthy { pool: String },
    Open { pool: String, source: DbError },
}

impl Display for PoolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { pool, waited } => write!(
                f,
                "pool `{pool}` had no free connection after {}ms",
                waited.as_millis()
            ),
            Self::Closed { pool } => write!(f, "pool `{pool}` is closed"),
            Self::Unhealthy { pool } => write!(f, "pool `{pool}` failed its last health check"),
            Self::Open { pool, source } => {
                write!(f, "pool `{pool}` could not open a connection: {source}")
            }
        }
    }
}

impl Error for PoolError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Open { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Point-in-time view of one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub name: String,
    pub size: u32,
    pub idle: usize,
    pub in_use: usize,
    pub healthy: bool,
    pub closed: bool,
}

struct PoolState {
    idle: Vec<Connection>,
    in_use: usize,
    live: usize,
    closed: bool,
}

struct PoolShared {
    config: PoolConfig,
    state: Mutex<PoolState>,
    available: Condvar,
    healthy: AtomicBool,
}

/// Shared handle to one named pool. Clones refer to the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    /// Opens all `config.size` connections.
    ///
    /// # Errors
    /// - Returns `PoolError::Open` when any connection fails to open or
    ///   bootstrap; already opened connections are dropped.
    pub fn open(config: PoolConfig) -> PoolResult<Self> {
        let mut idle = Vec::with_capacity(config.size as usize);
        for _ in 0..config.size {
            let conn = open_store(&config.location, config.access).map_err(|source| {
                PoolError::Open {
                    pool: config.name.clone(),
                    source,
                }
            })?;
            idle.push(conn);
        }

        info!(
            "event=pool_open module=db status=ok pool={} size={} access={}",
            config.name,
            config.size,
            config.access.as_str()
        );

        let live = idle.len();
        Ok(Self {
            shared: Arc::new(PoolShared {
                config,
                state: Mutex::new(PoolState {
                    idle,
                    in_use: 0,
                    live,
                    closed: false,
                }),
                available: Condvar::new(),
                healthy: AtomicBool::new(true),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    pub fn access(&self) -> AccessMode {
        self.shared.config.access
    }

    pub fn is_healthy(&self) -> bool {
        self.shared.healthy.load(Ordering::Acquire)
    }

    /// Takes one connection, waiting up to the configured acquire timeout.
    ///
    /// # Errors
    /// - `Closed` after `close()`.
    /// - `Unhealthy` while the last health check failed.
    /// - `Timeout` when no connection was returned in time.
    pub fn acquire(&self) -> PoolResult<PooledConnection> {
        let started_at = Instant::now();
        let deadline = started_at + self.shared.config.acquire_timeout;
        let mut state = self.shared.state.lock();

        loop {
            if state.closed {
                return Err(PoolError::Closed {
                    pool: self.name().to_string(),
                });
            }
            if !self.is_healthy() {
                return Err(PoolError::Unhealthy {
                    pool: self.name().to_string(),
                });
            }
            if let Some(conn) = state.idle.pop() {
                state.in_use += 1;
                return Ok(PooledConnection {
                    conn: Some(conn),
                    pool: Arc::clone(&self.shared),
                });
            }
            if self
                .shared
                .available
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return Err(PoolError::Timeout {
                    pool: self.name().to_string(),
                    waited: started_at.elapsed(),
                });
            }
        }
    }

    /// Probes one idle connection and refills lost slots.
    ///
    /// Returns the resulting health flag. A pool whose connections are all
    /// checked out keeps its previous flag.
    pub fn health_check(&self) -> bool {
        let candidate = {
            let mut state = self.shared.state.lock();
            if state.closed {
                drop(state);
                return self.set_healthy(false);
            }
            let conn = state.idle.pop();
            if conn.is_some() {
                state.in_use += 1;
            }
            conn
        };

        let probe_ok = match candidate {
            Some(conn) => match conn.query_row("SELECT 1;", [], |row| row.get::<_, i64>(0)) {
                Ok(_) => {
                    self.shared.give_back(conn);
                    true
                }
                Err(err) => {
                    warn!(
                        "event=pool_health module=db status=error pool={} error={}",
                        self.name(),
                        err
                    );
                    self.shared.discard();
                    false
                }
            },
            None => {
                if self.shared.state.lock().live == self.shared.config.size as usize {
                    return self.is_healthy();
                }
                true
            }
        };

        let refilled = self.refill();
        self.set_healthy(probe_ok && refilled)
    }

    /// Returns pool counters and health.
    pub fn status(&self) -> PoolStatus {
        let state = self.shared.state.lock();
        PoolStatus {
            name: self.name().to_string(),
            size: self.shared.config.size,
            idle: state.idle.len(),
            in_use: state.in_use,
            healthy: self.is_healthy(),
            closed: state.closed,
        }
    }

    /// Closes the pool. Idle connections are dropped now; checked-out ones
    /// are dropped when their guards are released. Idempotent.
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.live -= state.idle.len();
        state.idle.clear();
        drop(state);

        self.shared.healthy.store(false, Ordering::Release);
        self.shared.available.notify_all();
        info!("event=pool_close module=db status=ok pool={}", self.name());
    }

    fn refill(&self) -> bool {
        loop {
            {
                let state = self.shared.state.lock();
                if state.closed {
                    return false;
                }
                if state.live >= self.shared.config.size as usize {
                    return true;
                }
            }

            match open_store(&self.shared.config.location, self.shared.config.access) {
                Ok(conn) => {
                    let mut state = self.shared.state.lock();
                    if state.closed {
                        return false;
                    }
                    state.live += 1;
                    state.idle.push(conn);
                    drop(state);
                    self.shared.available.notify_one();
                }
                Err(err) => {
                    warn!(
                        "event=pool_refill module=db status=error pool={} error={}",
                        self.name(),
                        err
                    );
                    return false;
                }
            }
        }
    }

    fn set_healthy(&self, healthy: bool) -> bool {
        let previous = self.shared.healthy.swap(healthy, Ordering::AcqRel);
        if previous != healthy {
            if healthy {
                info!(
                    "event=pool_health module=db status=recovered pool={}",
                    self.name()
                );
            } else {
                warn!(
                    "event=pool_health module=db status=unhealthy pool={}",
                    self.name()
                );
            }
        }
        healthy
    }
}

impl PoolShared {
    fn give_back(&self, conn: Connection) {
        let mut state = self.state.lock();
        state.in_use -= 1;
        if state.closed {
            state.live -= 1;
            drop(state);
            drop(conn);
            return;
        }
        state.idle.push(conn);
        drop(state);
        self.available.notify_one();
    }

    fn discard(&self) {
        let mut state = self.state.lock();
        state.in_use -= 1;
        state.live -= 1;
    }
}

/// A connection checked out of a `ConnectionPool`.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<PoolShared>,
}

impl PooledConnection {
    pub fn pool_name(&self) -> &str {
        &self.pool.config.name
    }

    pub fn access(&self) -> AccessMode {
        self.pool.config.access
    }

    /// Drops a connection that should not be reused. The slot stays empty
    /// until the next `health_check` opens a replacement.
    pub fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            warn!(
                "event=pool_discard module=db status=ok pool={}",
                self.pool.config.name
            );
            self.pool.discard();
            drop(conn);
        }
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
            .as_ref()
            .expect("pooled connection is present until drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn
            .as_mut()
            .expect("pooled connection is present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            debug!(
                "event=pool_release module=db status=ok pool={}",
                self.pool.config.name
            );
            self.pool.give_back(conn);
        }
    }
}
