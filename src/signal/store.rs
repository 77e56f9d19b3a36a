//! Restart signal persistence.
//!
//! A stop request is a single timestamp stored under a well-known key. Every
//! worker that started at or before that moment treats it as a request to
//! stop. The SQLite implementation is shared between processes by pointing
//! them at the same directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use log::{debug, info};
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{Result, WorkerError};
use crate::id::{format_micros, now_micros};

/// Key holding the latest restart request timestamp.
pub const RESTART_REQUESTED_TIMESTAMP_KEY: &str = "workers.restart_requested_timestamp";

/// Durable, cross-process "stop all workers" flag.
pub trait RestartSignalStore: Send + Sync {
    /// Persist `at` (microseconds since epoch) as the latest stop request.
    fn record_stop_request(&self, at: i64) -> Result<()>;

    /// Read the latest stop request, if any was ever made.
    fn last_requested_at(&self) -> Result<Option<i64>>;

    /// Request a stop of every worker started up to now.
    fn request_stop(&self) -> Result<i64> {
        let at = now_micros();
        self.record_stop_request(at)?;
        Ok(at)
    }
}

/// SQLite-backed restart signal store.
pub struct SqliteSignalStore {
    path: Option<PathBuf>,
    db: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteSignalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSignalStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteSignalStore {
    /// Open or create the store under `dir` (as `signals.db`).
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let db_path = dir.join("signals.db");

        let db = Connection::open(&db_path).map_err(unavailable)?;
        db.busy_timeout(Duration::from_secs(5)).map_err(unavailable)?;
        Self::init_schema(&db)?;

        debug!("Opened restart signal store at {}", db_path.display());
        Ok(Self {
            path: Some(db_path),
            db: Mutex::new(db),
        })
    }

    /// Private, process-local store. Useful for tests and single-process embedding.
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().map_err(unavailable)?;
        Self::init_schema(&db)?;
        Ok(Self {
            path: None,
            db: Mutex::new(db),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init_schema(db: &Connection) -> Result<()> {
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );
            "#,
        )
        .map_err(unavailable)
    }
}

impl RestartSignalStore for SqliteSignalStore {
    fn record_stop_request(&self, at: i64) -> Result<()> {
        let db = self
            .db
            .lock()
            .map_err(|e| WorkerError::StoreUnavailable(e.to_string()))?;
        db.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![RESTART_REQUESTED_TIMESTAMP_KEY, at],
        )
        .map_err(unavailable)?;

        info!("Recorded worker stop request at {}", format_micros(at));
        Ok(())
    }

    fn last_requested_at(&self) -> Result<Option<i64>> {
        let db = self
            .db
            .lock()
            .map_err(|e| WorkerError::StoreUnavailable(e.to_string()))?;
        db.query_row(
            "SELECT value FROM meta WHERE key = ?1",
            params![RESTART_REQUESTED_TIMESTAMP_KEY],
            |row| row.get(0),
        )
        .optional()
        .map_err(unavailable)
    }
}

fn unavailable(err: rusqlite::Error) -> WorkerError {
    WorkerError::StoreUnavailable(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_store_has_no_request() {
        let store = SqliteSignalStore::open_in_memory().unwrap();
        assert_eq!(store.last_requested_at().unwrap(), None);
    }

    #[test]
    fn test_request_stop_records_timestamp() {
        let store = SqliteSignalStore::open_in_memory().unwrap();
        let before = now_micros();
        let at = store.request_stop().unwrap();
        assert!(at >= before);
        assert_eq!(store.last_requested_at().unwrap(), Some(at));
    }

    #[test]
    fn test_latest_request_wins() {
        let store = SqliteSignalStore::open_in_memory().unwrap();
        store.record_stop_request(100).unwrap();
        store.record_stop_request(250).unwrap();
        assert_eq!(store.last_requested_at().unwrap(), Some(250));
    }

    #[test]
    fn test_request_stop_twice_is_idempotent() {
        let store = SqliteSignalStore::open_in_memory().unwrap();
        store.request_stop().unwrap();
        let second = store.request_stop().unwrap();
        assert_eq!(store.last_requested_at().unwrap(), Some(second));
    }

    #[test]
    fn test_store_is_durable_across_handles() {
        let temp = TempDir::new().unwrap();

        let at = {
            let writer = SqliteSignalStore::open(temp.path()).unwrap();
            writer.request_stop().unwrap()
        };

        let reader = SqliteSignalStore::open(temp.path()).unwrap();
        assert_eq!(reader.last_requested_at().unwrap(), Some(at));
        assert_eq!(reader.path().unwrap(), temp.path().join("signals.db"));
    }

    #[test]
    fn test_concurrent_handles_see_each_others_writes() {
        let temp = TempDir::new().unwrap();
        let a = SqliteSignalStore::open(temp.path()).unwrap();
        let b = SqliteSignalStore::open(temp.path()).unwrap();

        a.record_stop_request(1_000).unwrap();
        assert_eq!(b.last_requested_at().unwrap(), Some(1_000));

        b.record_stop_request(2_000).unwrap();
        assert_eq!(a.last_requested_at().unwrap(), Some(2_000));
    }

    #[test]
    fn test_open_creates_missing_directory() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("var").join("cache");
        let store = SqliteSignalStore::open(&nested).unwrap();
        assert!(nested.join("signals.db").exists());
        assert_eq!(store.last_requested_at().unwrap(), None);
    }
}
