//! Ledger backend client contract.
//!
//! # Responsibility
//! - Describe the key/value operations repositories need from a ledger.
//! - Keep transport and contract encoding behind one pluggable trait.
//!
//! # Invariants
//! - Writes are appends; a removal is a tombstone entry, never an erase.
//! - Every call is bounded by the client's call timeout; implementations
//!   return `LedgerError::Timeout` instead of blocking indefinitely.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use uuid::Uuid;

mod memory;

pub use memory::{InMemoryLedger, LedgerEntry};

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    Unreachable(String),
    Timeout(Duration),
    /// The ledger refused the transaction.
    Rejected(String),
}

impl Display for LedgerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unreachable(endpoint) => write!(f, "ledger endpoint `{endpoint}` is unreachable"),
            Self::Timeout(waited) => write!(f, "ledger call timed out after {}ms", waited.as_millis()),
            Self::Rejected(reason) => write!(f, "ledger rejected transaction: {reason}"),
        }
    }
}

impl Error for LedgerError {}

/// Confirmation of one committed ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerReceipt {
    pub tx_id: Uuid,
    pub height: u64,
}

pub trait LedgerClient: Send + Sync {
    fn endpoint(&self) -> &str;

    /// Appends the current value for `key`.
    fn put(&self, namespace: &str, key: &str, payload: &[u8]) -> LedgerResult<LedgerReceipt>;

    /// Returns the current value, or `None` when absent or tombstoned.
    fn get(&self, namespace: &str, key: &str) -> LedgerResult<Option<Vec<u8>>>;

    /// Returns every live `(key, value)` in the namespace, ordered by key.
    fn scan(&self, namespace: &str) -> LedgerResult<Vec<(String, Vec<u8>)>>;

    /// Appends a tombstone. Returns `None` when the key was not live.
    fn remove(&self, namespace: &str, key: &str) -> LedgerResult<Option<LedgerReceipt>>;

    /// Number of committed entries.
    fn height(&self) -> LedgerResult<u64>;
}
