//! External service registration record.
//!
//! # Invariants
//! - `id` is the caller-chosen service key, not a generated uuid.
//! - `endpoint` is an absolute http(s) URL.

use super::entity::{Entity, RepositoryKind, ValidationError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static HTTP_ENDPOINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://[A-Za-z0-9.\-]+(:[0-9]{1,5})?(/\S*)?$").expect("valid endpoint regex")
});

/// Returns whether `value` is an absolute http(s) URL with a host.
pub(crate) fn is_http_endpoint(value: &str) -> bool {
    HTTP_ENDPOINT_RE.is_match(value)
}

/// A third-party service the platform exchanges data with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalService {
    pub id: String,
    pub name: String,
    pub endpoint: String,
}

impl ExternalService {
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            id: key.into(),
            name: name.into(),
            endpoint: endpoint.into(),
        }
    }
}

impl Entity for ExternalService {
    const KIND: RepositoryKind = RepositoryKind::ExternalService;

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::field("name", "cannot be blank"));
        }
        if !is_http_endpoint(&self.endpoint) {
            return Err(ValidationError::field(
                "endpoint",
                format!("`{}` is not an http(s) URL", self.endpoint),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::is_http_endpoint;

    #[test]
    fn endpoint_shape_checks() {
        assert!(is_http_endpoint("https://ledger.example.org:7051/api"));
        assert!(is_http_endpoint("http://localhost:8080"));
        assert!(!is_http_endpoint("ftp://example.org"));
        assert!(!is_http_endpoint("https://"));
        assert!(!is_http_endpoint("example.org"));
    }
}
