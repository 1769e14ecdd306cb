//! SQLite dedup store implementation
//!
//! This module provides a SQLite-based implementation of the DedupStore trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{DedupStore, StorageError, StorageResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// How long a writer waits on a locked database file before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(3);

/// SQLite dedup store backend
///
/// One connection guarded by a mutex serializes all reads and writes.
/// `None` once the store has been closed.
pub struct SqliteDedupStore {
    conn: Mutex<Option<Connection>>,
    collection: String,
    path: PathBuf,
}

impl SqliteDedupStore {
    /// Opens or creates the store at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `collection` - Table holding the visited keys
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteDedupStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database or create the table
    pub fn open(path: &Path, collection: &str) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        // FULL makes every committed mark survive a crash, WAL included
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn, collection)?;

        tracing::debug!(path = %path.display(), collection, "Opened dedup store");

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            collection: collection.to_string(),
            path: path.to_path_buf(),
        })
    }

    /// Creates an in-memory store (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn, "visited_urls")?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            collection: "visited_urls".to_string(),
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns the stored marker for `key`, if any
    pub fn visited_at(&self, key: &str) -> StorageResult<Option<String>> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(StorageError::Closed)?;

        let value = conn
            .query_row(
                &format!(r#"SELECT value FROM "{}" WHERE key = ?1"#, self.collection),
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        Ok(value)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DedupStore for SqliteDedupStore {
    fn is_visited(&self, key: &str) -> bool {
        match self.visited_at(key) {
            Ok(found) => found.is_some(),
            Err(e) => {
                tracing::warn!(key, error = %e, "Dedup lookup failed, treating as not visited");
                false
            }
        }
    }

    fn mark_visited(&self, key: &str) -> StorageResult<()> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(StorageError::Closed)?;

        // Autocommit: the row is durable once execute returns
        conn.execute(
            &format!(
                r#"INSERT OR REPLACE INTO "{}" (key, value) VALUES (?1, ?2)"#,
                self.collection
            ),
            params![key, Utc::now().to_rfc3339()],
        )?;

        Ok(())
    }

    fn visited_count(&self) -> StorageResult<u64> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(StorageError::Closed)?;

        let count: i64 = conn.query_row(
            &format!(r#"SELECT COUNT(*) FROM "{}""#, self.collection),
            [],
            |row| row.get(0),
        )?;

        Ok(count as u64)
    }

    fn close(&self) -> StorageResult<()> {
        let Some(conn) = self.lock().take() else {
            return Ok(());
        };

        conn.close().map_err(|(_, e)| StorageError::Sqlite(e))?;
        tracing::debug!(path = %self.path.display(), "Closed dedup store");
        Ok(())
    }
}
