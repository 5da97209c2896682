//! Ledger-backed repository.
//!
//! # Responsibility
//! - Store records as JSON bytes under the kind's ledger namespace.
//! - Report ledger failures with the same kinds as the relational backend.
//!
//! # Invariants
//! - The route context is never read or changed; ledger calls do not use
//!   the relational pools.
//! - `delete_by` appends one tombstone per matching live record.

use super::criteria::Criteria;
use super::{decode_record, encode_record, parse_payload, RepositoryPort};
use crate::error::{DataError, DataResult};
use crate::ledger::{LedgerClient, LedgerError};
use crate::model::entity::Entity;
use crate::routing::RouteContext;
use log::{info, warn};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

const BACKEND: &str = "ledger";

pub struct LedgerRepository<T> {
    client: Arc<dyn LedgerClient>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> LedgerRepository<T> {
    pub fn new(client: Arc<dyn LedgerClient>) -> Self {
        Self {
            client,
            _entity: PhantomData,
        }
    }

    /// Returns live records of this kind, decoded and filtered, by id.
    fn matching(&self, criteria: &Criteria) -> DataResult<Vec<(String, T)>> {
        let mut matched = Vec::new();
        for (key, raw) in self.client.scan(T::KIND.namespace())? {
            let value = parse_payload(T::KIND, &raw)?;
            if criteria.matches(&value) {
                matched.push((key, decode_record::<T>(value)?));
            }
        }
        Ok(matched)
    }
}

/// A rejected write did not persist; anything else is a transport problem.
fn write_failure<T: Entity>(key: &str, err: LedgerError) -> DataError {
    match err {
        LedgerError::Rejected(_) => DataError::not_saved(T::KIND, key, err),
        other => other.into(),
    }
}

impl<T: Entity> RepositoryPort<T> for LedgerRepository<T> {
    fn save(&self, _ctx: &mut RouteContext, entity: &T) -> DataResult<T> {
        entity.check()?;
        let payload = encode_record(entity)?;
        let started_at = Instant::now();

        match self
            .client
            .put(T::KIND.namespace(), entity.id(), payload.as_bytes())
        {
            Ok(receipt) => {
                info!(
                    "event=record_save module=repo status=ok backend={} kind={} height={} duration_ms={}",
                    BACKEND,
                    T::KIND,
                    receipt.height,
                    started_at.elapsed().as_millis()
                );
                Ok(entity.clone())
            }
            Err(err) => {
                warn!(
                    "event=record_save module=repo status=error backend={} kind={} duration_ms={} error={}",
                    BACKEND,
                    T::KIND,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(write_failure::<T>(entity.id(), err))
            }
        }
    }

    fn find_by_id(&self, _ctx: &mut RouteContext, id: &str) -> DataResult<Option<T>> {
        match self.client.get(T::KIND.namespace(), id)? {
            Some(raw) => decode_record(parse_payload(T::KIND, &raw)?).map(Some),
            None => Ok(None),
        }
    }

    fn find_all(&self, _ctx: &mut RouteContext, criteria: &Criteria) -> DataResult<Vec<T>> {
        criteria.validate()?;
        let matched = self.matching(criteria)?;
        Ok(criteria.paginate(matched.into_iter().map(|(_, entity)| entity)))
    }

    fn delete_by(&self, _ctx: &mut RouteContext, criteria: &Criteria) -> DataResult<u64> {
        criteria.validate()?;
        let mut deleted = 0;
        for (key, _) in self.matching(criteria)? {
            let removed = self
                .client
                .remove(T::KIND.namespace(), &key)
                .map_err(|err| write_failure::<T>(&key, err))?;
            if removed.is_some() {
                deleted += 1;
            }
        }
        info!(
            "event=record_delete module=repo status=ok backend={} kind={} deleted={}",
            BACKEND,
            T::KIND,
            deleted
        );
        Ok(deleted)
    }
}
