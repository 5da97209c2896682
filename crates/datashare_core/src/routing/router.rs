//! Primary/replica connection routing.
//!
//! # Responsibility
//! - Own one pool per route and hand out connections from the pool selected
//!   by the caller's `RouteContext`.
//! - Apply the configured policy when the replica cannot serve a read.
//!
//! # Invariants
//! - Both routes have a pool; the primary pool is writable.
//! - A primary acquisition never touches the replica pool. A replica
//!   acquisition touches the primary pool only under `FallbackToPrimary`.
//! - Replica reads are eventually consistent with primary writes; callers
//!   that need their own writes use a consistent-read scope.

use super::context::{Route, RouteContext};
use crate::db::pool::{ConnectionPool, PoolError, PoolStatus, PooledConnection};
use crate::db::AccessMode;
use crate::error::{DataError, DataResult};
use log::{debug, warn};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

/// What to do when the replica pool cannot serve a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaPolicy {
    /// Serve the read from the primary pool and log a warning.
    #[default]
    FallbackToPrimary,
    /// Fail the read with `DataError::ReplicaUnavailable`.
    Fail,
}

/// A pooled connection tagged with the route that served it.
pub struct RoutedConnection {
    requested: Route,
    served: Route,
    conn: PooledConnection,
}

impl RoutedConnection {
    /// Route of the pool this connection came from.
    pub fn route(&self) -> Route {
        self.served
    }

    pub fn requested_route(&self) -> Route {
        self.requested
    }

    pub fn fell_back(&self) -> bool {
        self.requested != self.served
    }

    pub fn pool_name(&self) -> &str {
        self.conn.pool_name()
    }
}

impl Deref for RoutedConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl DerefMut for RoutedConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

pub struct ConnectionRouter {
    pools: BTreeMap<Route, ConnectionPool>,
    replica_policy: ReplicaPolicy,
}

impl ConnectionRouter {
    /// Builds a router over the registered pools.
    ///
    /// # Errors
    /// - `Configuration` when a route has no pool, or the primary pool is
    ///   not writable.
    pub fn new(
        pools: impl IntoIterator<Item = (Route, ConnectionPool)>,
        replica_policy: ReplicaPolicy,
    ) -> DataResult<Self> {
        let pools: BTreeMap<Route, ConnectionPool> = pools.into_iter().collect();
        for route in [Route::Primary, Route::Replica] {
            if !pools.contains_key(&route) {
                return Err(DataError::Configuration(format!(
                    "no connection pool registered for route `{route}`"
                )));
            }
        }
        if let Some(primary) = pools.get(&Route::Primary) {
            if primary.access() != AccessMode::ReadWrite {
                return Err(DataError::Configuration(format!(
                    "primary pool `{}` must be read-write",
                    primary.name()
                )));
            }
        }

        Ok(Self {
            pools,
            replica_policy,
        })
    }

    pub fn replica_policy(&self) -> ReplicaPolicy {
        self.replica_policy
    }

    pub fn pool(&self, route: Route) -> Option<&ConnectionPool> {
        self.pools.get(&route)
    }

    /// Returns status for every pool, primary first.
    pub fn pool_status(&self) -> Vec<(Route, PoolStatus)> {
        self.pools
            .iter()
            .map(|(route, pool)| (*route, pool.status()))
            .collect()
    }

    /// Acquires a connection for the route currently set in `ctx`.
    ///
    /// # Errors
    /// - `TransportFailure` when the primary pool is closed, unhealthy or
    ///   exhausted.
    /// - `ReplicaUnavailable` when the replica cannot serve and the policy is
    ///   `Fail`.
    pub fn acquire(&self, ctx: &RouteContext) -> DataResult<RoutedConnection> {
        let requested = ctx.current();
        match requested {
            Route::Primary => self.acquire_primary(requested),
            Route::Replica => match self.pool_for(Route::Replica)?.acquire() {
                Ok(conn) => Ok(self.routed(requested, Route::Replica, conn)),
                Err(err) => self.on_replica_failure(err),
            },
        }
    }

    /// Closes every pool. Idempotent.
    pub fn close(&self) {
        for pool in self.pools.values() {
            pool.close();
        }
    }

    fn on_replica_failure(&self, err: PoolError) -> DataResult<RoutedConnection> {
        match self.replica_policy {
            ReplicaPolicy::Fail => {
                warn!(
                    "event=pool_acquire module=routing status=error route=replica policy=fail error={}",
                    err
                );
                Err(DataError::ReplicaUnavailable(err))
            }
            ReplicaPolicy::FallbackToPrimary => {
                warn!(
                    "event=replica_fallback module=routing status=start route=replica error={}",
                    err
                );
                self.acquire_primary(Route::Replica)
            }
        }
    }

    fn acquire_primary(&self, requested: Route) -> DataResult<RoutedConnection> {
        match self.pool_for(Route::Primary)?.acquire() {
            Ok(conn) => Ok(self.routed(requested, Route::Primary, conn)),
            Err(err) => {
                warn!(
                    "event=pool_acquire module=routing status=error route=primary error={}",
                    err
                );
                Err(DataError::TransportFailure {
                    backend: "relational",
                    reason: err.to_string(),
                })
            }
        }
    }

    fn pool_for(&self, route: Route) -> DataResult<&ConnectionPool> {
        self.pools.get(&route).ok_or_else(|| {
            DataError::Configuration(format!("no connection pool registered for route `{route}`"))
        })
    }

    fn routed(&self, requested: Route, served: Route, conn: PooledConnection) -> RoutedConnection {
        debug!(
            "event=pool_acquire module=routing status=ok requested={} served={} pool={}",
            requested,
            served,
            conn.pool_name()
        );
        RoutedConnection {
            requested,
            served,
            conn,
        }
    }
}
