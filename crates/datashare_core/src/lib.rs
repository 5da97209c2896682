//! Persistence routing for the data-sharing platform.
//!
//! Every domain repository is served by either a relational store (split into
//! primary and replica pools) or a ledger store, chosen per call by a
//! strategy token. Route state travels with the call chain as an explicit
//! `RouteContext`.

pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod repo;
pub mod routing;
pub mod runtime;
pub mod selector;
pub mod service;

pub use config::AppConfig;
pub use error::{DataError, DataResult};
pub use ledger::{InMemoryLedger, LedgerClient, LedgerError};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::account::Account;
pub use model::entity::{Entity, RepositoryKind, ValidationError};
pub use model::external_service::ExternalService;
pub use model::offer::Offer;
pub use model::search_request::SearchRequest;
pub use repo::{Criteria, RepositoryPort};
pub use routing::{
    intercept, ConnectionRouter, ReplicaPolicy, Route, RouteContext, TransactionDescriptor,
};
pub use runtime::PersistenceRuntime;
pub use selector::{BackendSelector, RepositoryBinding, StrategyToken};
pub use service::marketplace::{MarketplaceError, MarketplaceService};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
