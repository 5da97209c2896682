//! Startup and shutdown of the persistence layer.
//!
//! # Responsibility
//! - Open the primary pool, then the replica pool, from validated config.
//! - Wire the router, ledger client, health monitor and backend selector.
//! - Close every pool exactly once on shutdown.
//!
//! # Invariants
//! - A runtime only exists after both pools opened and the ledger client
//!   was configured; a partial startup closes whatever it opened.
//! - `shutdown()` is idempotent and also runs on drop.

use crate::config::AppConfig;
use crate::db::pool::{ConnectionPool, PoolStatus};
use crate::error::{DataError, DataResult};
use crate::ledger::{InMemoryLedger, LedgerClient};
use crate::routing::health::HealthMonitor;
use crate::routing::{ConnectionRouter, ReplicaPolicy, Route};
use crate::selector::BackendSelector;
use log::{error, info};
use std::sync::Arc;

pub struct PersistenceRuntime {
    router: Arc<ConnectionRouter>,
    ledger: Arc<dyn LedgerClient>,
    selector: BackendSelector,
    monitor: Option<HealthMonitor>,
}

impl PersistenceRuntime {
    /// Starts with an in-process ledger bound to the configured endpoint.
    pub fn start(config: &AppConfig) -> DataResult<Self> {
        let settings = config.ledger_settings()?;
        let ledger = InMemoryLedger::new(settings.endpoint.clone(), settings.call_timeout());
        Self::start_with_ledger(config, Arc::new(ledger))
    }

    /// Starts with a caller-provided ledger client.
    ///
    /// # Errors
    /// - `Configuration` when config validation fails, a pool cannot open,
    ///   or the health monitor thread cannot be spawned.
    pub fn start_with_ledger(config: &AppConfig, ledger: Arc<dyn LedgerClient>) -> DataResult<Self> {
        config.validate()?;
        if let Some(logging) = &config.logging {
            crate::logging::init_from_settings(logging)?;
        }
        info!(
            "event=runtime_start module=runtime status=start replica_policy={:?} ledger_endpoint={}",
            config.replica_policy,
            ledger.endpoint()
        );

        let primary = open_pool(config, Route::Primary)?;
        let replica = match open_pool(config, Route::Replica) {
            Ok(pool) => pool,
            Err(err) => {
                primary.close();
                return Err(err);
            }
        };

        let monitored = vec![primary.clone(), replica.clone()];
        let router = Arc::new(route_pools(primary, replica, config.replica_policy)?);

        let monitor = match HealthMonitor::start(monitored, config.health_check_interval()) {
            Ok(monitor) => monitor,
            Err(err) => {
                router.close();
                return Err(DataError::Configuration(format!(
                    "cannot start health monitor: {err}"
                )));
            }
        };

        let selector = BackendSelector::new(Arc::clone(&router), Arc::clone(&ledger));
        info!("event=runtime_start module=runtime status=ok");

        Ok(Self {
            router,
            ledger,
            selector,
            monitor: Some(monitor),
        })
    }

    pub fn selector(&self) -> &BackendSelector {
        &self.selector
    }

    pub fn router(&self) -> &Arc<ConnectionRouter> {
        &self.router
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    pub fn pool_status(&self) -> Vec<(Route, PoolStatus)> {
        self.router.pool_status()
    }

    /// Stops health checks and closes both pools.
    pub fn shutdown(&mut self) {
        let Some(mut monitor) = self.monitor.take() else {
            return;
        };
        monitor.stop();
        self.router.close();
        info!("event=runtime_shutdown module=runtime status=ok");
    }
}

impl Drop for PersistenceRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Builds the router, closing both pools when they are rejected.
fn route_pools(
    primary: ConnectionPool,
    replica: ConnectionPool,
    policy: ReplicaPolicy,
) -> DataResult<ConnectionRouter> {
    let opened = [primary.clone(), replica.clone()];
    ConnectionRouter::new([(Route::Primary, primary), (Route::Replica, replica)], policy).map_err(
        |err| {
            for pool in &opened {
                pool.close();
            }
            error!(
                "event=runtime_start module=runtime status=error stage=router error={}",
                err
            );
            err
        },
    )
}

fn open_pool(config: &AppConfig, route: Route) -> DataResult<ConnectionPool> {
    let pool_config = config.pool_config(route)?;
    ConnectionPool::open(pool_config).map_err(|err| {
        error!(
            "event=runtime_start module=runtime status=error route={} error={}",
            route, err
        );
        DataError::Configuration(format!("cannot open {route} pool: {err}"))
    })
}
