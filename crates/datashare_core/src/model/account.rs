//! Account record.
//!
//! # Invariants
//! - `email` has a `local@domain` shape.
//! - `display_name` is never blank.

use super::entity::{Entity, RepositoryKind, ValidationError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

/// A platform participant that owns offers and search requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub display_name: String,
}

impl Account {
    /// Creates an account with a generated id.
    pub fn new(email: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.into(),
            display_name: display_name.into(),
        }
    }
}

impl Entity for Account {
    const KIND: RepositoryKind = RepositoryKind::Account;

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if !EMAIL_RE.is_match(&self.email) {
            return Err(ValidationError::field(
                "email",
                format!("`{}` is not an email address", self.email),
            ));
        }
        if self.display_name.trim().is_empty() {
            return Err(ValidationError::field("display_name", "cannot be blank"));
        }
        Ok(())
    }
}
