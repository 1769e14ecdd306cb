//! Storage traits and error types
//!
//! This module defines the trait interface for dedup store backends and
//! associated error types.

use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid collection name: {0}")]
    InvalidCollection(String),

    #[error("Store is closed")]
    Closed,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable record of identifiers that have already been processed
///
/// Presence of a key is the only signal that matters; the stored value is
/// an opaque marker. Implementations serialize concurrent callers
/// themselves, so every call is atomic and independent.
pub trait DedupStore: Send + Sync {
    /// Returns true if `key` has been marked
    ///
    /// Never fails: a storage fault is logged and reported as "not visited",
    /// preferring redundant work over silently skipping new data.
    fn is_visited(&self, key: &str) -> bool;

    /// Marks `key` as processed
    ///
    /// Idempotent. When this returns `Ok`, the mark survives a process crash.
    fn mark_visited(&self, key: &str) -> StorageResult<()>;

    /// Number of marked keys
    fn visited_count(&self) -> StorageResult<u64>;

    /// Releases the underlying resources
    ///
    /// Calling it more than once is harmless. After closing, `is_visited`
    /// returns false and `mark_visited` fails with `StorageError::Closed`.
    fn close(&self) -> StorageResult<()>;
}
