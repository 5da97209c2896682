//! Backend-neutral query criteria.
//!
//! # Invariants
//! - Filters are a conjunction of equality tests on top-level record fields.
//! - Field names match `^[a-z][a-z0-9_]*$`; values are JSON scalars.
//! - A `null` filter matches records where the field is null or absent.
//! - Numbers compare by numeric value, so `5` matches `5.0`, as SQLite does.

use crate::error::{DataError, DataResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static FIELD_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid field name regex"));

/// One equality filter.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

/// Filters plus pagination for `find_all`; `delete_by` uses filters only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    pub filters: Vec<FieldFilter>,
    pub limit: Option<u32>,
    pub offset: u32,
}

impl Criteria {
    /// Matches every record.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn field_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(FieldFilter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub(crate) fn validate(&self) -> DataResult<()> {
        for filter in &self.filters {
            if !FIELD_NAME_RE.is_match(&filter.field) {
                return Err(DataError::InvalidCriteria(format!(
                    "field name `{}` must match [a-z][a-z0-9_]*",
                    filter.field
                )));
            }
            if matches!(filter.value, Value::Array(_) | Value::Object(_)) {
                return Err(DataError::InvalidCriteria(format!(
                    "filter on `{}` must use a scalar value",
                    filter.field
                )));
            }
        }
        Ok(())
    }

    /// Evaluates the filters against a decoded record.
    pub(crate) fn matches(&self, record: &Value) -> bool {
        self.filters
            .iter()
            .all(|filter| scalar_eq(record.get(&filter.field), &filter.value))
    }

    /// Compact `field=value` rendering used to identify a filtered write.
    pub(crate) fn summary(&self) -> String {
        if self.filters.is_empty() {
            return "*".to_string();
        }
        self.filters
            .iter()
            .map(|filter| format!("{}={}", filter.field, filter.value))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Applies offset and limit to an already ordered sequence.
    pub(crate) fn paginate<T>(&self, items: impl Iterator<Item = T>) -> Vec<T> {
        let skipped = items.skip(self.offset as usize);
        match self.limit {
            Some(limit) => skipped.take(limit as usize).collect(),
            None => skipped.collect(),
        }
    }
}

fn scalar_eq(actual: Option<&Value>, expected: &Value) -> bool {
    match (actual, expected) {
        (None | Some(Value::Null), Value::Null) => true,
        (Some(Value::Number(a)), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        (Some(Value::String(a)), Value::String(b)) => a == b,
        (Some(Value::Bool(a)), Value::Bool(b)) => a == b,
        _ => false,
    }
}
