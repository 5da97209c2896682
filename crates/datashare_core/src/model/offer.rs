//! Offer record.

use super::entity::{Entity, RepositoryKind, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A dataset offered for sharing by one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: String,
    /// Owning account id. Existence is checked by the marketplace service,
    /// not by the record itself.
    pub account_id: String,
    pub title: String,
    pub price_cents: i64,
    pub published: bool,
}

impl Offer {
    /// Creates an unpublished offer with a generated id.
    pub fn new(account_id: impl Into<String>, title: impl Into<String>, price_cents: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.into(),
            title: title.into(),
            price_cents,
            published: false,
        }
    }
}

impl Entity for Offer {
    const KIND: RepositoryKind = RepositoryKind::Offer;

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.account_id.trim().is_empty() {
            return Err(ValidationError::field("account_id", "cannot be blank"));
        }
        if self.title.trim().is_empty() {
            return Err(ValidationError::field("title", "cannot be blank"));
        }
        if self.price_cents < 0 {
            return Err(ValidationError::field(
                "price_cents",
                format!("must be >= 0, got {}", self.price_cents),
            ));
        }
        Ok(())
    }
}
