//! Relational repository over the primary/replica connection router.
//!
//! # Responsibility
//! - Store records as JSON payloads in the kind's table.
//! - Run writes in read-write scopes (primary) and reads in read-only
//!   scopes (replica), restoring the caller's route afterwards.
//!
//! # Invariants
//! - Every write commits in its own SQL transaction or reports
//!   `DataNotSaved`.
//! - Filter field paths are bound as parameters, never spliced into SQL.

use super::criteria::Criteria;
use super::{decode_record, encode_record, parse_payload, RepositoryPort};
use crate::db::retry_locked;
use crate::error::{DataError, DataResult};
use crate::model::entity::Entity;
use crate::routing::{intercept, ConnectionRouter, RouteContext, TransactionDescriptor};
use log::{debug, info, warn};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, OptionalExtension};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

const BACKEND: &str = "relational";

pub struct SqliteRepository<T> {
    router: Arc<ConnectionRouter>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> SqliteRepository<T> {
    pub fn new(router: Arc<ConnectionRouter>) -> Self {
        Self {
            router,
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> RepositoryPort<T> for SqliteRepository<T> {
    fn save(&self, ctx: &mut RouteContext, entity: &T) -> DataResult<T> {
        entity.check()?;
        let payload = encode_record(entity)?;
        let table = T::KIND.table();
        let started_at = Instant::now();
        let sql = format!(
            "INSERT INTO {table} (id, payload) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
                payload = excluded.payload,
                updated_at = (strftime('%s', 'now') * 1000);"
        );

        let result: DataResult<T> = intercept(ctx, TransactionDescriptor::read_write("save"), |ctx| {
            let mut conn = self.router.acquire(ctx)?;
            retry_locked("save", || {
                let tx = conn.transaction()?;
                tx.execute(&sql, params![entity.id(), payload])?;
                tx.commit()
            })
            .map_err(|err| DataError::not_saved(T::KIND, entity.id(), err))?;
            Ok(entity.clone())
        });

        match &result {
            Ok(_) => info!(
                "event=record_save module=repo status=ok backend={} kind={} duration_ms={}",
                BACKEND,
                T::KIND,
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=record_save module=repo status=error backend={} kind={} duration_ms={} error={}",
                BACKEND,
                T::KIND,
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    fn find_by_id(&self, ctx: &mut RouteContext, id: &str) -> DataResult<Option<T>> {
        let sql = format!("SELECT payload FROM {} WHERE id = ?1;", T::KIND.table());
        intercept(ctx, TransactionDescriptor::read_only("find_by_id"), |ctx| {
            let conn = self.router.acquire(ctx)?;
            let payload: Option<String> = retry_locked("find_by_id", || {
                conn.query_row(&sql, [id], |row| row.get(0)).optional()
            })?;
            debug!(
                "event=record_find module=repo status=ok backend={} kind={} route={} found={}",
                BACKEND,
                T::KIND,
                conn.route(),
                payload.is_some()
            );

            payload.map(|text| parse_text::<T>(&text)).transpose()
        })
    }

    fn find_all(&self, ctx: &mut RouteContext, criteria: &Criteria) -> DataResult<Vec<T>> {
        criteria.validate()?;
        let (mut sql, mut bind_values) = filtered_sql::<T>("SELECT payload", criteria);
        sql.push_str(" ORDER BY id ASC");

        if let Some(limit) = criteria.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(SqlValue::Integer(i64::from(limit)));
            if criteria.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(SqlValue::Integer(i64::from(criteria.offset)));
            }
        } else if criteria.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(SqlValue::Integer(i64::from(criteria.offset)));
        }

        intercept(ctx, TransactionDescriptor::read_only("find_all"), |ctx| {
            let conn = self.router.acquire(ctx)?;
            let payloads: Vec<String> = retry_locked("find_all", || {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(bind_values.iter()), |row| row.get(0))?;
                rows.collect()
            })?;
            payloads.iter().map(|text| parse_text::<T>(text)).collect()
        })
    }

    fn delete_by(&self, ctx: &mut RouteContext, criteria: &Criteria) -> DataResult<u64> {
        criteria.validate()?;
        let (sql, bind_values) = filtered_sql::<T>("DELETE", criteria);

        intercept(ctx, TransactionDescriptor::read_write("delete_by"), |ctx| {
            let conn = self.router.acquire(ctx)?;
            let deleted = retry_locked("delete_by", || {
                conn.execute(&sql, params_from_iter(bind_values.iter()))
            })
            .map_err(|err| DataError::not_saved(T::KIND, &criteria.summary(), err))?;
            info!(
                "event=record_delete module=repo status=ok backend={} kind={} deleted={}",
                BACKEND,
                T::KIND,
                deleted
            );
            Ok(deleted as u64)
        })
    }
}

/// Builds `<head> FROM <table> WHERE ...` with bound paths and values.
///
/// Each filter also checks the stored JSON type, so `true` never matches `1`
/// and text never matches a number, as in `Criteria::matches`.
fn filtered_sql<T: Entity>(head: &str, criteria: &Criteria) -> (String, Vec<SqlValue>) {
    let mut sql = format!("{head} FROM {} WHERE 1 = 1", T::KIND.table());
    let mut bind_values = Vec::new();

    for filter in &criteria.filters {
        let path = SqlValue::Text(format!("$.{}", filter.field));
        match &filter.value {
            Value::Null => {
                sql.push_str(" AND json_extract(payload, ?) IS NULL");
                bind_values.push(path);
            }
            Value::Bool(flag) => {
                sql.push_str(" AND json_type(payload, ?) = ?");
                bind_values.push(path);
                bind_values.push(SqlValue::Text(if *flag { "true" } else { "false" }.to_string()));
            }
            Value::Number(_) | Value::String(_) => {
                let types = if filter.value.is_string() {
                    "('text')"
                } else {
                    "('integer', 'real')"
                };
                sql.push_str(&format!(
                    " AND json_type(payload, ?) IN {types} AND json_extract(payload, ?) = ?"
                ));
                bind_values.push(path.clone());
                bind_values.push(path);
                bind_values.push(scalar_to_sql(&filter.value));
            }
            Value::Array(_) | Value::Object(_) => {
                sql.push_str(" AND 0 = 1");
            }
        }
    }

    (sql, bind_values)
}

/// Maps a number or string filter value to the type `json_extract` yields.
fn scalar_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Number(number) => match number.as_i64() {
            Some(int) => SqlValue::Integer(int),
            None => SqlValue::Real(number.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        _ => SqlValue::Null,
    }
}

fn parse_text<T: Entity>(text: &str) -> DataResult<T> {
    decode_record(parse_payload(T::KIND, text.as_bytes())?)
}
