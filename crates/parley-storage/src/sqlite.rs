//! SQLite-backed `KeyValueStore`.
//!
//! The store owns its connection. Its schema is a single `kv_entries` table,
//! versioned through `PRAGMA user_version`. Several widget activations may
//! share one file, so writers wait on a busy lock instead of failing and the
//! last write wins.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use parley_core::error::ParleyError;

use crate::kv::KeyValueStore;

const SCHEMA_VERSION: i32 = 1;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn storage_err(action: &'static str) -> impl Fn(rusqlite::Error) -> ParleyError {
    move |e| ParleyError::Storage(format!("{}: {}", action, e))
}

/// Local records in a SQLite file.
pub struct SqliteKeyValueStore {
    conn: Mutex<Connection>,
}

impl SqliteKeyValueStore {
    /// Open or create the store at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, ParleyError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(storage_err("Cannot open record store"))?;

        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(storage_err("Cannot enable WAL"))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(storage_err("Cannot set synchronous mode"))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(storage_err("Cannot set busy timeout"))?;

        info!(path = %path.display(), journal = %mode, "Record store opened");
        Self::with_connection(conn)
    }

    /// A store that lives only as long as this handle.
    pub fn in_memory() -> Result<Self, ParleyError> {
        let conn =
            Connection::open_in_memory().map_err(storage_err("Cannot open in-memory store"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, ParleyError> {
        ensure_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ParleyError> {
        self.conn
            .lock()
            .map_err(|e| ParleyError::Storage(format!("Record store lock poisoned: {}", e)))
    }
}

/// Bring the schema up to `SCHEMA_VERSION`. Reopening a current file is a no-op.
fn ensure_schema(conn: &Connection) -> Result<(), ParleyError> {
    let version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(storage_err("Cannot read schema version"))?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    conn.execute_batch(
        "BEGIN;
         CREATE TABLE IF NOT EXISTS kv_entries (
             key         TEXT PRIMARY KEY NOT NULL,
             value       TEXT NOT NULL,
             updated_at  TEXT NOT NULL
         );
         PRAGMA user_version = 1;
         COMMIT;",
    )
    .map_err(storage_err("Cannot create kv_entries"))?;
    info!(from = version, to = SCHEMA_VERSION, "Record store schema upgraded");
    Ok(())
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, ParleyError> {
        self.conn()?
            .query_row(
                "SELECT value FROM kv_entries WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err("Cannot read record"))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ParleyError> {
        self.conn()?
            .execute(
                "INSERT INTO kv_entries (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .map_err(storage_err("Cannot write record"))?;
        debug!(key, "Record written");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, ParleyError> {
        let removed = self
            .conn()?
            .execute("DELETE FROM kv_entries WHERE key = ?1", params![key])
            .map_err(storage_err("Cannot delete record"))?;
        Ok(removed > 0)
    }
}

impl std::fmt::Debug for SqliteKeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteKeyValueStore").finish_non_exhaustive()
    }
}
