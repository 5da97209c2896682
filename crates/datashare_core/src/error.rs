//! Caller-facing error taxonomy for the persistence layer.
//!
//! # Responsibility
//! - Collapse backend-specific failures into one set of kinds, so domain
//!   code never needs per-backend error handling.
//!
//! # Invariants
//! - "Record not found" is never an error; lookups return `Ok(None)`.
//! - Conversions keep the original failure as `source()` or in the message;
//!   nothing is mapped to success.

use crate::db::pool::PoolError;
use crate::db::DbError;
use crate::ledger::LedgerError;
use crate::model::entity::{RepositoryKind, ValidationError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type DataResult<T> = Result<T, DataError>;

#[derive(Debug)]
pub enum DataError {
    /// Strategy indicator outside `{relational, ledger}`.
    UnsupportedStrategy(String),
    /// Repository kind name not registered.
    UnknownRepositoryKind(String),
    /// Missing pool, missing endpoint or invalid startup configuration.
    Configuration(String),
    /// A backend reported that a write did not persist.
    DataNotSaved {
        kind: RepositoryKind,
        id: String,
        reason: String,
    },
    /// A backend was unreachable or timed out.
    TransportFailure {
        backend: &'static str,
        reason: String,
    },
    /// The replica pool cannot serve reads and fallback is disabled.
    ReplicaUnavailable(PoolError),
    /// Record failed validation, or persisted data could not be decoded.
    InvalidRecord(String),
    /// Unusable query criteria.
    InvalidCriteria(String),
    /// Relational read failed after a connection was acquired.
    Storage(DbError),
}

impl DataError {
    pub(crate) fn not_saved(kind: RepositoryKind, id: &str, reason: impl Display) -> Self {
        Self::DataNotSaved {
            kind,
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl Display for DataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedStrategy(value) => write!(
                f,
                "unsupported strategy `{value}`; expected relational|ledger"
            ),
            Self::UnknownRepositoryKind(value) => write!(f, "unknown repository kind `{value}`"),
            Self::Configuration(message) => write!(f, "configuration error: {message}"),
            Self::DataNotSaved { kind, id, reason } => {
                write!(f, "{kind} `{id}` was not saved: {reason}")
            }
            Self::TransportFailure { backend, reason } => {
                write!(f, "{backend} backend unavailable: {reason}")
            }
            Self::ReplicaUnavailable(err) => write!(f, "replica unavailable: {err}"),
            Self::InvalidRecord(message) => write!(f, "invalid record: {message}"),
            Self::InvalidCriteria(message) => write!(f, "invalid criteria: {message}"),
            Self::Storage(err) => write!(f, "storage error: {err}"),
        }
    }
}

impl Error for DataError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ReplicaUnavailable(err) => Some(err),
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for DataError {
    fn from(value: ValidationError) -> Self {
        Self::InvalidRecord(value.to_string())
    }
}

impl From<DbError> for DataError {
    fn from(value: DbError) -> Self {
        Self::Storage(value)
    }
}

impl From<rusqlite::Error> for DataError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(DbError::Sqlite(value))
    }
}

impl From<LedgerError> for DataError {
    fn from(value: LedgerError) -> Self {
        Self::TransportFailure {
            backend: "ledger",
            reason: value.to_string(),
        }
    }
}
