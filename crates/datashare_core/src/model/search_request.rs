//! Search request record.

use super::entity::{Entity, RepositoryKind, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_SEARCH_RESULTS: u32 = 100;

/// A persisted offer search issued by one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub id: String,
    pub account_id: String,
    /// Case-insensitive substring matched against offer titles.
    pub query: String,
    pub max_results: u32,
}

impl SearchRequest {
    pub fn new(account_id: impl Into<String>, query: impl Into<String>, max_results: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.into(),
            query: query.into(),
            max_results,
        }
    }
}

impl Entity for SearchRequest {
    const KIND: RepositoryKind = RepositoryKind::SearchRequest;

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.query.trim().is_empty() {
            return Err(ValidationError::field("query", "cannot be blank"));
        }
        if self.max_results == 0 || self.max_results > MAX_SEARCH_RESULTS {
            return Err(ValidationError::field(
                "max_results",
                format!("must be within 1..={MAX_SEARCH_RESULTS}"),
            ));
        }
        Ok(())
    }
}
