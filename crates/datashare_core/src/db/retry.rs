//! Retry of statements that lost a lock race.
//!
//! # Invariants
//! - Only `SQLITE_LOCKED` and `SQLITE_BUSY` are retried; every other error is
//!   returned on the first attempt.
//! - The whole unit passed in is re-run, so it must roll back cleanly on
//!   failure (a dropped `Transaction` does).
//! - Retrying stops after `LOCK_WAIT_LIMIT` and returns the last error.

use log::{debug, warn};
use rusqlite::ErrorCode;
use std::time::{Duration, Instant};

/// Upper bound for lock waits; matches the connection busy timeout.
pub(crate) const LOCK_WAIT_LIMIT: Duration = Duration::from_secs(5);

const FIRST_BACKOFF: Duration = Duration::from_millis(1);
const MAX_BACKOFF: Duration = Duration::from_millis(16);

/// Runs `unit` until it stops failing with a lock conflict.
///
/// Shared-cache stores report table-lock conflicts as `SQLITE_LOCKED`, which
/// the busy handler never waits on.
pub fn retry_locked<R>(
    label: &'static str,
    mut unit: impl FnMut() -> rusqlite::Result<R>,
) -> rusqlite::Result<R> {
    let started_at = Instant::now();
    let mut backoff = FIRST_BACKOFF;
    let mut attempts: u32 = 1;

    loop {
        match unit() {
            Err(err) if is_lock_conflict(&err) => {
                if started_at.elapsed() >= LOCK_WAIT_LIMIT {
                    warn!(
                        "event=lock_retry module=db status=error op={} attempts={} error={}",
                        label, attempts, err
                    );
                    return Err(err);
                }
                std::thread::sleep(backoff);
                backoff = (backoff * 2).min(MAX_BACKOFF);
                attempts += 1;
            }
            outcome => {
                if attempts > 1 {
                    debug!(
                        "event=lock_retry module=db status=ok op={} attempts={}",
                        label, attempts
                    );
                }
                return outcome;
            }
        }
    }
}

fn is_lock_conflict(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if matches!(failure.code, ErrorCode::DatabaseLocked | ErrorCode::DatabaseBusy)
    )
}

#[cfg(test)]
mod tests {
    use super::retry_locked;
    use crate::db::{open_store, AccessMode, StoreLocation};
    use std::sync::mpsc;
    use std::time::Duration;
    use uuid::Uuid;

    #[test]
    fn waits_out_a_shared_cache_table_lock() {
        let location = StoreLocation::Memory(format!("retry-{}", Uuid::new_v4()));
        let holder = open_store(&location, AccessMode::ReadWrite).unwrap();
        let writer = open_store(&location, AccessMode::ReadWrite).unwrap();

        let (locked_tx, locked_rx) = mpsc::channel();
        let handle = std::thread::spawn(move || {
            holder
                .execute_batch(
                    "BEGIN; INSERT INTO accounts (id, payload) VALUES ('a1', '{}');",
                )
                .unwrap();
            locked_tx.send(()).unwrap();
            std::thread::sleep(Duration::from_millis(60));
            holder.execute_batch("COMMIT;").unwrap();
        });

        locked_rx.recv().unwrap();
        retry_locked("insert", || {
            writer.execute(
                "INSERT INTO accounts (id, payload) VALUES ('a2', '{}');",
                [],
            )
        })
        .unwrap();
        handle.join().unwrap();

        let count: i64 = writer
            .query_row("SELECT COUNT(*) FROM accounts;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn other_errors_are_not_retried() {
        let location = StoreLocation::Memory(format!("retry-{}", Uuid::new_v4()));
        let conn = open_store(&location, AccessMode::ReadWrite).unwrap();
        let mut attempts = 0;

        let err = retry_locked("bad_sql", || {
            attempts += 1;
            conn.execute("INSERT INTO missing_table VALUES (1);", [])
        })
        .unwrap_err();
        assert_eq!(attempts, 1);
        assert!(err.to_string().contains("missing_table"));
    }
}
