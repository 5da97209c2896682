//! Static startup configuration.
//!
//! # Responsibility
//! - Deserialize pool, ledger and logging settings from JSON.
//! - Reject incomplete or malformed settings before any pool is opened.
//!
//! # Invariants
//! - Configuration is loaded once and never mutated; changing it requires a
//!   restart.
//! - Every validation failure is reported as `DataError::Configuration`.

use crate::db::pool::PoolConfig;
use crate::db::{AccessMode, StoreLocation};
use crate::error::{DataError, DataResult};
use crate::model::external_service::is_http_endpoint;
use crate::routing::{ReplicaPolicy, Route};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use std::path::Path;
use std::time::Duration;

const MAX_POOL_SIZE: u32 = 64;

static MEMORY_STORE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_\-]+$").expect("valid store name regex"));

fn default_pool_size() -> u32 {
    4
}

fn default_acquire_timeout_ms() -> u64 {
    2_000
}

fn default_health_check_interval_ms() -> u64 {
    30_000
}

fn default_call_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolSettings {
    pub location: StoreLocation,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerSettings {
    pub endpoint: String,
    pub channel: String,
    #[serde(default)]
    pub credentials: Option<String>,
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

impl LedgerSettings {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

impl Debug for LedgerSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerSettings")
            .field("endpoint", &self.endpoint)
            .field("channel", &self.channel)
            .field("credentials", &self.credentials.as_ref().map(|_| "<redacted>"))
            .field("call_timeout_ms", &self.call_timeout_ms)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    #[serde(default = "default_level")]
    pub level: String,
    /// Absolute directory for rolling log files.
    pub dir: String,
}

fn default_level() -> String {
    crate::logging::default_log_level().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub primary: Option<PoolSettings>,
    #[serde(default)]
    pub replica: Option<PoolSettings>,
    #[serde(default)]
    pub replica_policy: ReplicaPolicy,
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    #[serde(default)]
    pub ledger: Option<LedgerSettings>,
    #[serde(default)]
    pub logging: Option<LoggingSettings>,
}

impl AppConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(text: &str) -> DataResult<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|err| DataError::Configuration(format!("malformed configuration: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn load(path: impl AsRef<Path>) -> DataResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            DataError::Configuration(format!("cannot read `{}`: {err}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> DataResult<()> {
        for route in [Route::Primary, Route::Replica] {
            validate_pool(route, self.pool_settings(route)?)?;
        }

        if self.health_check_interval_ms == 0 {
            return Err(DataError::Configuration(
                "health_check_interval_ms must be > 0".to_string(),
            ));
        }

        let ledger = self.ledger_settings()?;
        if !is_http_endpoint(&ledger.endpoint) {
            return Err(DataError::Configuration(format!(
                "ledger endpoint `{}` is not an http(s) URL",
                ledger.endpoint
            )));
        }
        if ledger.channel.trim().is_empty() {
            return Err(DataError::Configuration(
                "ledger channel cannot be empty".to_string(),
            ));
        }
        if ledger.call_timeout_ms == 0 {
            return Err(DataError::Configuration(
                "ledger call_timeout_ms must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn pool_settings(&self, route: Route) -> DataResult<&PoolSettings> {
        let settings = match route {
            Route::Primary => self.primary.as_ref(),
            Route::Replica => self.replica.as_ref(),
        };
        settings.ok_or_else(|| {
            DataError::Configuration(format!("{route} pool is not configured"))
        })
    }

    /// Builds the pool parameters for one route.
    pub fn pool_config(&self, route: Route) -> DataResult<PoolConfig> {
        let settings = self.pool_settings(route)?;
        Ok(PoolConfig {
            name: route.as_str().to_string(),
            location: settings.location.clone(),
            access: match route {
                Route::Primary => AccessMode::ReadWrite,
                Route::Replica => AccessMode::ReadOnly,
            },
            size: settings.pool_size,
            acquire_timeout: Duration::from_millis(settings.acquire_timeout_ms),
        })
    }

    pub fn ledger_settings(&self) -> DataResult<&LedgerSettings> {
        self.ledger
            .as_ref()
            .ok_or_else(|| DataError::Configuration("ledger backend is not configured".to_string()))
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }
}

fn validate_pool(route: Route, settings: &PoolSettings) -> DataResult<()> {
    if settings.pool_size == 0 || settings.pool_size > MAX_POOL_SIZE {
        return Err(DataError::Configuration(format!(
            "{route} pool_size must be within 1..={MAX_POOL_SIZE}, got {}",
            settings.pool_size
        )));
    }
    if settings.acquire_timeout_ms == 0 {
        return Err(DataError::Configuration(format!(
            "{route} acquire_timeout_ms must be > 0"
        )));
    }
    match &settings.location {
        StoreLocation::File(path) if path.as_os_str().is_empty() => Err(DataError::Configuration(
            format!("{route} file location cannot be empty"),
        )),
        StoreLocation::Memory(name) if !MEMORY_STORE_NAME_RE.is_match(name) => {
            Err(DataError::Configuration(format!(
                "{route} memory store name `{name}` must match [A-Za-z0-9_-]+"
            )))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::AppConfig;
    use crate::db::{AccessMode, StoreLocation};
    use crate::error::DataError;
    use crate::routing::{ReplicaPolicy, Route};
    use serde_json::json;

    fn base() -> serde_json::Value {
        json!({
            "primary": { "location": { "memory": "cfg" }, "pool_size": 2 },
            "replica": { "location": { "memory": "cfg" } },
            "ledger": {
                "endpoint": "https://ledger.example.org:7051",
                "channel": "datashare",
                "credentials": "s3cret"
            }
        })
    }

    fn parse(value: serde_json::Value) -> Result<AppConfig, DataError> {
        AppConfig::from_json_str(&value.to_string())
    }

    #[test]
    fn applies_defaults() {
        let config = parse(base()).unwrap();
        assert_eq!(config.replica_policy, ReplicaPolicy::FallbackToPrimary);
        assert_eq!(config.replica.as_ref().unwrap().pool_size, 4);

        let replica = config.pool_config(Route::Replica).unwrap();
        assert_eq!(replica.name, "replica");
        assert_eq!(replica.access, AccessMode::ReadOnly);
        assert_eq!(replica.location, StoreLocation::Memory("cfg".to_string()));
        assert_eq!(config.ledger_settings().unwrap().call_timeout_ms, 5_000);
    }

    #[test]
    fn parses_fail_policy() {
        let mut value = base();
        value["replica_policy"] = json!("fail");
        assert_eq!(parse(value).unwrap().replica_policy, ReplicaPolicy::Fail);
    }

    #[test]
    fn missing_replica_is_configuration_error() {
        let mut value = base();
        value.as_object_mut().unwrap().remove("replica");
        let err = parse(value).unwrap_err();
        assert!(matches!(err, DataError::Configuration(ref msg) if msg.contains("replica")));
    }

    #[test]
    fn missing_ledger_is_configuration_error() {
        let mut value = base();
        value.as_object_mut().unwrap().remove("ledger");
        assert!(matches!(parse(value), Err(DataError::Configuration(_))));
    }

    #[test]
    fn rejects_malformed_endpoint_and_store_name() {
        let mut value = base();
        value["ledger"]["endpoint"] = json!("grpc://ledger");
        assert!(matches!(parse(value), Err(DataError::Configuration(_))));

        let mut value = base();
        value["primary"]["location"] = json!({ "memory": "x?mode=rw" });
        assert!(matches!(parse(value), Err(DataError::Configuration(_))));
    }

    #[test]
    fn rejects_unknown_fields() {
        let mut value = base();
        value["replicas"] = json!([]);
        assert!(matches!(parse(value), Err(DataError::Configuration(_))));
    }

    #[test]
    fn debug_output_redacts_credentials() {
        let config = parse(base()).unwrap();
        let rendered = format!("{:?}", config.ledger_settings().unwrap());
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<redacted>"));
    }
}
