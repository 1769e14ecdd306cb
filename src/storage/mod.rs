//! Storage module for the persistent dedup record
//!
//! This module remembers which targets have already been processed:
//! - SQLite database initialization and schema management
//! - Fail-open visited lookups
//! - Idempotent, crash-consistent marks

mod schema;
mod sqlite;
mod traits;

pub use schema::{collection_ddl, initialize_schema};
pub use sqlite::SqliteDedupStore;
pub use traits::{DedupStore, StorageError, StorageResult};

use crate::config::StorageConfig;
use std::path::Path;

/// Opens the dedup store described by the `[storage]` section
///
/// # Arguments
///
/// * `config` - Storage configuration
///
/// # Returns
///
/// * `Ok(SqliteDedupStore)` - Successfully opened store
/// * `Err(StorageError)` - Failed to open the database or its collection
pub fn open_store(config: &StorageConfig) -> StorageResult<SqliteDedupStore> {
    SqliteDedupStore::open(Path::new(&config.database_path), &config.collection)
}
