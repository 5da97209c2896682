//! Record contract shared by relational and ledger repositories.
//!
//! # Responsibility
//! - Enumerate the repository kinds known at startup.
//! - Describe how a record exposes its identity and validation rules.
//!
//! # Invariants
//! - `RepositoryKind::ALL` lists every kind; selectors must cover all of them.
//! - Table and namespace names are static and never derived from input.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Repository families registered with the backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RepositoryKind {
    Account,
    Offer,
    SearchRequest,
    ExternalService,
}

impl RepositoryKind {
    pub const ALL: [RepositoryKind; 4] = [
        RepositoryKind::Account,
        RepositoryKind::Offer,
        RepositoryKind::SearchRequest,
        RepositoryKind::ExternalService,
    ];

    /// Stable snake_case name used in logs and ledger namespaces.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Offer => "offer",
            Self::SearchRequest => "search_request",
            Self::ExternalService => "external_service",
        }
    }

    /// Relational table holding this kind's records.
    pub fn table(self) -> &'static str {
        match self {
            Self::Account => "accounts",
            Self::Offer => "offers",
            Self::SearchRequest => "search_requests",
            Self::ExternalService => "external_services",
        }
    }

    /// Ledger namespace holding this kind's records.
    pub fn namespace(self) -> &'static str {
        self.as_str()
    }
}

impl Display for RepositoryKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepositoryKind {
    type Err = String;

    /// Accepts snake_case and CamelCase spellings (`search_request`,
    /// `SearchRequest`), ignoring case and surrounding whitespace.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized: String = value
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "account" => Ok(Self::Account),
            "offer" => Ok(Self::Offer),
            "searchrequest" => Ok(Self::SearchRequest),
            "externalservice" => Ok(Self::ExternalService),
            _ => Err(value.trim().to_string()),
        }
    }
}

/// Record validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyId,
    InvalidField { field: &'static str, reason: String },
}

impl ValidationError {
    pub(crate) fn field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "record id cannot be empty"),
            Self::InvalidField { field, reason } => write!(f, "invalid `{field}`: {reason}"),
        }
    }
}

impl Error for ValidationError {}

/// A record that can be stored by any repository backend.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: RepositoryKind;

    fn id(&self) -> &str;

    /// Checks record-specific field rules. Id emptiness is checked by
    /// `Entity::check` and need not be repeated here.
    fn validate(&self) -> Result<(), ValidationError>;

    fn check(&self) -> Result<(), ValidationError> {
        if self.id().trim().is_empty() {
            return Err(ValidationError::EmptyId);
        }
        self.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::RepositoryKind;

    #[test]
    fn parses_snake_and_camel_case_names() {
        assert_eq!(
            "external_service".parse::<RepositoryKind>(),
            Ok(RepositoryKind::ExternalService)
        );
        assert_eq!(
            " ExternalService ".parse::<RepositoryKind>(),
            Ok(RepositoryKind::ExternalService)
        );
        assert_eq!(
            "SEARCH-REQUEST".parse::<RepositoryKind>(),
            Ok(RepositoryKind::SearchRequest)
        );
    }

    #[test]
    fn rejects_unknown_names() {
        assert_eq!(
            "wallet".parse::<RepositoryKind>(),
            Err("wallet".to_string())
        );
    }

    #[test]
    fn every_kind_has_distinct_table() {
        let mut tables: Vec<_> = RepositoryKind::ALL.iter().map(|k| k.table()).collect();
        tables.sort_unstable();
        tables.dedup();
        assert_eq!(tables.len(), RepositoryKind::ALL.len());
    }
}
