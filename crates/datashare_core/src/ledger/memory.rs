//! In-process append-only ledger.
//!
//! Serves as the default `LedgerClient` when no remote ledger is wired in,
//! and as the ledger backend in tests. Entries are kept in commit order and
//! the latest entry per key is its current value.

use super::{LedgerClient, LedgerError, LedgerReceipt, LedgerResult};
use log::debug;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// One committed ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub height: u64,
    pub tx_id: Uuid,
    pub namespace: String,
    pub key: String,
    /// `None` marks a tombstone.
    pub payload: Option<Vec<u8>>,
}

#[derive(Default)]
struct LedgerState {
    entries: Vec<LedgerEntry>,
    heads: BTreeMap<(String, String), usize>,
}

impl LedgerState {
    fn append(&mut self, namespace: &str, key: &str, payload: Option<Vec<u8>>) -> LedgerReceipt {
        let receipt = LedgerReceipt {
            tx_id: Uuid::new_v4(),
            height: self.entries.len() as u64 + 1,
        };
        self.entries.push(LedgerEntry {
            height: receipt.height,
            tx_id: receipt.tx_id,
            namespace: namespace.to_string(),
            key: key.to_string(),
            payload,
        });
        self.heads
            .insert((namespace.to_string(), key.to_string()), self.entries.len() - 1);
        receipt
    }

    fn current(&self, namespace: &str, key: &str) -> Option<&[u8]> {
        let index = self.heads.get(&(namespace.to_string(), key.to_string()))?;
        self.entries[*index].payload.as_deref()
    }
}

pub struct InMemoryLedger {
    endpoint: String,
    call_timeout: Duration,
    state: RwLock<LedgerState>,
}

impl InMemoryLedger {
    pub fn new(endpoint: impl Into<String>, call_timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            call_timeout,
            state: RwLock::new(LedgerState::default()),
        }
    }

    /// Returns every entry ever committed for `key`, oldest first.
    pub fn history(&self, namespace: &str, key: &str) -> LedgerResult<Vec<LedgerEntry>> {
        Ok(self
            .read()?
            .entries
            .iter()
            .filter(|entry| entry.namespace == namespace && entry.key == key)
            .cloned()
            .collect())
    }

    fn read(&self) -> LedgerResult<RwLockReadGuard<'_, LedgerState>> {
        self.state
            .try_read_for(self.call_timeout)
            .ok_or(LedgerError::Timeout(self.call_timeout))
    }

    fn write(&self) -> LedgerResult<RwLockWriteGuard<'_, LedgerState>> {
        self.state
            .try_write_for(self.call_timeout)
            .ok_or(LedgerError::Timeout(self.call_timeout))
    }
}

fn check_address(namespace: &str, key: &str) -> LedgerResult<()> {
    if namespace.is_empty() || key.is_empty() {
        return Err(LedgerError::Rejected(
            "namespace and key must be non-empty".to_string(),
        ));
    }
    Ok(())
}

impl LedgerClient for InMemoryLedger {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn put(&self, namespace: &str, key: &str, payload: &[u8]) -> LedgerResult<LedgerReceipt> {
        check_address(namespace, key)?;
        let receipt = self.write()?.append(namespace, key, Some(payload.to_vec()));
        debug!(
            "event=ledger_put module=ledger status=ok namespace={} height={}",
            namespace, receipt.height
        );
        Ok(receipt)
    }

    fn get(&self, namespace: &str, key: &str) -> LedgerResult<Option<Vec<u8>>> {
        Ok(self.read()?.current(namespace, key).map(<[u8]>::to_vec))
    }

    fn scan(&self, namespace: &str) -> LedgerResult<Vec<(String, Vec<u8>)>> {
        let state = self.read()?;
        Ok(state
            .heads
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .filter_map(|((_, key), index)| {
                state.entries[*index]
                    .payload
                    .as_ref()
                    .map(|payload| (key.clone(), payload.clone()))
            })
            .collect())
    }

    fn remove(&self, namespace: &str, key: &str) -> LedgerResult<Option<LedgerReceipt>> {
        check_address(namespace, key)?;
        let mut state = self.write()?;
        if state.current(namespace, key).is_none() {
            return Ok(None);
        }
        Ok(Some(state.append(namespace, key, None)))
    }

    fn height(&self) -> LedgerResult<u64> {
        Ok(self.read()?.entries.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::InMemoryLedger;
    use crate::ledger::{LedgerClient, LedgerError};
    use std::time::Duration;

    fn ledger() -> InMemoryLedger {
        InMemoryLedger::new("https://ledger.test", Duration::from_millis(50))
    }

    #[test]
    fn latest_put_wins_and_history_is_kept() {
        let ledger = ledger();
        ledger.put("offer", "o1", b"v1").unwrap();
        let receipt = ledger.put("offer", "o1", b"v2").unwrap();

        assert_eq!(receipt.height, 2);
        assert_eq!(ledger.get("offer", "o1").unwrap().as_deref(), Some(&b"v2"[..]));
        assert_eq!(ledger.history("offer", "o1").unwrap().len(), 2);
    }

    #[test]
    fn remove_appends_tombstone_once() {
        let ledger = ledger();
        ledger.put("offer", "o1", b"v1").unwrap();

        assert!(ledger.remove("offer", "o1").unwrap().is_some());
        assert!(ledger.remove("offer", "o1").unwrap().is_none());
        assert_eq!(ledger.get("offer", "o1").unwrap(), None);
        assert_eq!(ledger.height().unwrap(), 2);
    }

    #[test]
    fn scan_is_namespaced_and_ordered() {
        let ledger = ledger();
        ledger.put("offer", "b", b"2").unwrap();
        ledger.put("account", "a", b"x").unwrap();
        ledger.put("offer", "a", b"1").unwrap();
        ledger.put("offer", "c", b"3").unwrap();
        ledger.remove("offer", "c").unwrap();

        let keys: Vec<_> = ledger
            .scan("offer")
            .unwrap()
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn rejects_empty_key() {
        let err = ledger().put("offer", "", b"v").unwrap_err();
        assert!(matches!(err, LedgerError::Rejected(_)));
    }
}
