//! Repository port and its backend implementations.
//!
//! # Responsibility
//! - Define the one operation contract every backend implements.
//! - Keep SQL and ledger details inside their implementations.
//!
//! # Invariants
//! - Writes validate the record before touching a backend.
//! - Reads reject invalid persisted state instead of masking it.
//! - Absence is `Ok(None)` in every backend; failures use the shared
//!   `DataError` kinds so callers never branch on the backend.

use crate::error::{DataError, DataResult};
use crate::model::entity::{Entity, RepositoryKind};
use crate::routing::RouteContext;

pub mod criteria;
pub mod ledger_repo;
pub mod sqlite_repo;

pub use criteria::{Criteria, FieldFilter};
pub use ledger_repo::LedgerRepository;
pub use sqlite_repo::SqliteRepository;

/// Storage contract for one record type.
///
/// Every operation takes the caller's route context. Relational
/// implementations scope their route changes to the call; other backends
/// leave the context untouched.
pub trait RepositoryPort<T: Entity>: Send + Sync {
    /// Inserts or replaces the record with the same id.
    fn save(&self, ctx: &mut RouteContext, entity: &T) -> DataResult<T>;

    fn find_by_id(&self, ctx: &mut RouteContext, id: &str) -> DataResult<Option<T>>;

    /// Returns matching records ordered by id ascending.
    fn find_all(&self, ctx: &mut RouteContext, criteria: &Criteria) -> DataResult<Vec<T>>;

    /// Deletes matching records and returns how many were deleted.
    fn delete_by(&self, ctx: &mut RouteContext, criteria: &Criteria) -> DataResult<u64>;
}

pub(crate) fn encode_record<T: Entity>(entity: &T) -> DataResult<String> {
    serde_json::to_string(entity).map_err(|err| {
        DataError::InvalidRecord(format!("cannot encode {} `{}`: {err}", T::KIND, entity.id()))
    })
}

pub(crate) fn decode_record<T: Entity>(value: serde_json::Value) -> DataResult<T> {
    let entity: T = serde_json::from_value(value).map_err(|err| {
        DataError::InvalidRecord(format!("cannot decode persisted {}: {err}", T::KIND))
    })?;
    entity.check().map_err(|err| {
        DataError::InvalidRecord(format!(
            "persisted {} `{}` is invalid: {err}",
            T::KIND,
            entity.id()
        ))
    })?;
    Ok(entity)
}

pub(crate) fn parse_payload(kind: RepositoryKind, raw: &[u8]) -> DataResult<serde_json::Value> {
    serde_json::from_slice(raw).map_err(|err| {
        DataError::InvalidRecord(format!("persisted {kind} payload is not JSON: {err}"))
    })
}
