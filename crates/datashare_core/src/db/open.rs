//! Connection bootstrap utilities for SQLite stores.
//!
//! # Responsibility
//! - Open file or shared in-memory SQLite connections.
//! - Configure connection pragmas according to the access mode.
//! - Migrate writable stores and verify read-only stores before returning.
//!
//! # Invariants
//! - Read-write connections have `foreign_keys=ON` and migrations applied.
//! - Read-only connections have `query_only=ON` and never create the store.

use super::migrations::{apply_migrations, ensure_current};
use super::retry::LOCK_WAIT_LIMIT;
use super::{AccessMode, DbResult, StoreLocation};
use log::{error, info};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::Instant;

/// Opens a store with the given access mode.
///
/// # Side effects
/// - Read-write mode creates missing file stores and applies migrations.
/// - Emits `db_open` logging events with duration and status.
pub fn open_store(location: &StoreLocation, access: AccessMode) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!(
        "event=db_open module=db status=start location={} access={}",
        location,
        access.as_str()
    );

    let mut conn = match connect(location, access) {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error location={} access={} duration_ms={} error_code=db_open_failed error={}",
                location,
                access.as_str(),
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    let is_file = matches!(location, StoreLocation::File(_));
    match bootstrap_connection(&mut conn, access, is_file) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok location={} access={} duration_ms={}",
                location,
                access.as_str(),
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error location={} access={} duration_ms={} error_code=db_bootstrap_failed error={}",
                location,
                access.as_str(),
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

/// Opens (creating if needed) a writable file store and applies migrations.
///
/// Used to provision primary and replica files ahead of pool startup.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_store(
        &StoreLocation::File(path.as_ref().to_path_buf()),
        AccessMode::ReadWrite,
    )
}

/// Opens a private in-memory store with all migrations applied.
pub fn open_db_in_memory() -> DbResult<Connection> {
    let mut conn = Connection::open_in_memory()?;
    bootstrap_connection(&mut conn, AccessMode::ReadWrite, false)?;
    Ok(conn)
}

fn connect(location: &StoreLocation, access: AccessMode) -> rusqlite::Result<Connection> {
    let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;

    match location {
        StoreLocation::File(path) => {
            if access == AccessMode::ReadWrite {
                flags |= OpenFlags::SQLITE_OPEN_CREATE;
            }
            Connection::open_with_flags(path, flags)
        }
        StoreLocation::Memory(name) => {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
            Connection::open_with_flags(format!("file:{name}?mode=memory&cache=shared"), flags)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection, access: AccessMode, is_file: bool) -> DbResult<()> {
    conn.busy_timeout(LOCK_WAIT_LIMIT)?;
    match access {
        AccessMode::ReadWrite => {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            if is_file {
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                    row.get::<_, String>(0)
                })?;
            }
            apply_migrations(conn)?;
        }
        AccessMode::ReadOnly => {
            conn.pragma_update(None, "query_only", true)?;
            ensure_current(conn)?;
        }
    }
    Ok(())
}
