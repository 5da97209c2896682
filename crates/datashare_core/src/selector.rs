//! Strategy-based backend selection.
//!
//! # Responsibility
//! - Parse caller-supplied strategy indicators and repository kind names.
//! - Map every (kind, strategy) pair to one repository implementation.
//!
//! # Invariants
//! - The mapping is total: every `RepositoryKind` resolves under every
//!   `StrategyToken`, enforced by exhaustive matches.
//! - Resolution has no side effects; equal inputs yield equivalent ports.
//! - An absent or blank indicator means `Relational`; an unknown one is
//!   rejected, never defaulted.

use crate::error::{DataError, DataResult};
use crate::ledger::LedgerClient;
use crate::model::account::Account;
use crate::model::entity::{Entity, RepositoryKind};
use crate::model::external_service::ExternalService;
use crate::model::offer::Offer;
use crate::model::search_request::SearchRequest;
use crate::repo::{LedgerRepository, RepositoryPort, SqliteRepository};
use crate::routing::ConnectionRouter;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

/// Backend family targeted by one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StrategyToken {
    #[default]
    Relational,
    Ledger,
}

impl StrategyToken {
    pub const ALL: [StrategyToken; 2] = [StrategyToken::Relational, StrategyToken::Ledger];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Relational => "relational",
            Self::Ledger => "ledger",
        }
    }

    /// Parses an optional external indicator.
    ///
    /// # Errors
    /// - `UnsupportedStrategy` when present, non-blank and unrecognized.
    pub fn from_indicator(indicator: Option<&str>) -> DataResult<Self> {
        match indicator.map(str::trim) {
            None | Some("") => Ok(Self::Relational),
            Some(value) => value.parse(),
        }
    }
}

impl Display for StrategyToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyToken {
    type Err = DataError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "relational" => Ok(Self::Relational),
            "ledger" => Ok(Self::Ledger),
            _ => Err(DataError::UnsupportedStrategy(value.trim().to_string())),
        }
    }
}

/// A resolved repository, one variant per kind.
pub enum RepositoryBinding {
    Account(Arc<dyn RepositoryPort<Account>>),
    Offer(Arc<dyn RepositoryPort<Offer>>),
    SearchRequest(Arc<dyn RepositoryPort<SearchRequest>>),
    ExternalService(Arc<dyn RepositoryPort<ExternalService>>),
}

impl RepositoryBinding {
    pub fn kind(&self) -> RepositoryKind {
        match self {
            Self::Account(_) => RepositoryKind::Account,
            Self::Offer(_) => RepositoryKind::Offer,
            Self::SearchRequest(_) => RepositoryKind::SearchRequest,
            Self::ExternalService(_) => RepositoryKind::ExternalService,
        }
    }
}

/// Resolves repositories for a strategy. Cheap to clone and share.
#[derive(Clone)]
pub struct BackendSelector {
    router: Arc<ConnectionRouter>,
    ledger: Arc<dyn LedgerClient>,
}

impl BackendSelector {
    pub fn new(router: Arc<ConnectionRouter>, ledger: Arc<dyn LedgerClient>) -> Self {
        Self { router, ledger }
    }

    /// Typed resolution for callers that know the record type.
    pub fn repository<T: Entity>(&self, strategy: StrategyToken) -> Arc<dyn RepositoryPort<T>> {
        match strategy {
            StrategyToken::Relational => Arc::new(SqliteRepository::<T>::new(Arc::clone(&self.router))),
            StrategyToken::Ledger => Arc::new(LedgerRepository::<T>::new(Arc::clone(&self.ledger))),
        }
    }

    /// Typed resolution from an external strategy indicator.
    pub fn resolve_for<T: Entity>(
        &self,
        indicator: Option<&str>,
    ) -> DataResult<Arc<dyn RepositoryPort<T>>> {
        Ok(self.repository(StrategyToken::from_indicator(indicator)?))
    }

    /// Resolves a repository from external kind and strategy inputs.
    ///
    /// # Errors
    /// - `UnknownRepositoryKind` when `kind` names no registered kind.
    /// - `UnsupportedStrategy` when `indicator` is not recognized.
    pub fn resolve(&self, kind: &str, indicator: Option<&str>) -> DataResult<RepositoryBinding> {
        let kind: RepositoryKind = kind
            .parse()
            .map_err(DataError::UnknownRepositoryKind)?;
        let strategy = StrategyToken::from_indicator(indicator)?;
        Ok(self.bind(kind, strategy))
    }

    /// Total mapping from kind and strategy to a binding.
    pub fn bind(&self, kind: RepositoryKind, strategy: StrategyToken) -> RepositoryBinding {
        match kind {
            RepositoryKind::Account => RepositoryBinding::Account(self.repository(strategy)),
            RepositoryKind::Offer => RepositoryBinding::Offer(self.repository(strategy)),
            RepositoryKind::SearchRequest => {
                RepositoryBinding::SearchRequest(self.repository(strategy))
            }
            RepositoryKind::ExternalService => {
                RepositoryBinding::ExternalService(self.repository(strategy))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::StrategyToken;
    use crate::error::DataError;

    #[test]
    fn absent_or_blank_indicator_defaults_to_relational() {
        assert_eq!(
            StrategyToken::from_indicator(None).unwrap(),
            StrategyToken::Relational
        );
        assert_eq!(
            StrategyToken::from_indicator(Some("  ")).unwrap(),
            StrategyToken::Relational
        );
    }

    #[test]
    fn parses_known_tokens_case_insensitively() {
        assert_eq!(
            StrategyToken::from_indicator(Some("LEDGER")).unwrap(),
            StrategyToken::Ledger
        );
        assert_eq!(
            StrategyToken::from_indicator(Some(" Relational ")).unwrap(),
            StrategyToken::Relational
        );
    }

    #[test]
    fn rejects_unknown_tokens() {
        for token in ["blockchain", "db", "relational,ledger", "LEDGER2"] {
            let err = StrategyToken::from_indicator(Some(token)).unwrap_err();
            assert!(
                matches!(err, DataError::UnsupportedStrategy(ref value) if value == token),
                "token {token} should be unsupported"
            );
        }
    }
}
