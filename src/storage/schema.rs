//! Database schema definitions
//!
//! Each dedup collection is one key/value table. The key is the raw target
//! URL and the value is the RFC 3339 time of the latest mark.

use crate::config::is_valid_collection_name;
use crate::storage::traits::{StorageError, StorageResult};
use rusqlite::Connection;

/// Returns the DDL for a collection table
///
/// The name is validated first since it is spliced into the statement.
pub fn collection_ddl(collection: &str) -> StorageResult<String> {
    if !is_valid_collection_name(collection) {
        return Err(StorageError::InvalidCollection(collection.to_string()));
    }

    Ok(format!(
        r#"
CREATE TABLE IF NOT EXISTS "{collection}" (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
) WITHOUT ROWID;
"#
    ))
}

/// Initializes the database schema for `collection`
///
/// # Arguments
///
/// * `conn` - Database connection
/// * `collection` - Table name holding the visited keys
///
/// # Returns
///
/// * `Ok(())` - Table exists (created or already present)
/// * `Err(StorageError)` - Invalid name or failed to create the table
pub fn initialize_schema(conn: &Connection, collection: &str) -> StorageResult<()> {
    conn.execute_batch(&collection_ddl(collection)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_creation() {
        let conn = Connection::open_in_memory().unwrap();
        let result = initialize_schema(&conn, "visited_urls");
        assert!(result.is_ok());
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        initialize_schema(&conn, "visited_urls").unwrap();
        let result = initialize_schema(&conn, "visited_urls");

        assert!(result.is_ok());
    }

    #[test]
    fn test_table_exists_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn, "visited_urls").unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                ["visited_urls"],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_invalid_collection_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        let result = initialize_schema(&conn, "visited\"; DROP TABLE x; --");
        assert!(matches!(result, Err(StorageError::InvalidCollection(_))));
    }
}
