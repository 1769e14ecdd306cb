//! Output sink traits and record types
//!
//! This module defines the trait interface for record sinks and the
//! structure of one harvested phone.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sink is closed")]
    Closed,
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// One harvested phone, written as a single JSON line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneRecord {
    /// Model name from the detail page title
    pub model_name: String,

    /// Brand, derived from the listing page the phone was found on
    pub brand: String,

    /// Release date, or `Unknown`
    pub release_date: String,

    /// Detail page URL, also the dedup key
    pub url: String,

    /// Specification table as label → value
    pub specs: BTreeMap<String, String>,

    /// RFC 3339 time the page was processed
    pub crawled_at: String,
}

impl PhoneRecord {
    /// Creates a record stamped with the current time
    pub fn new(
        model_name: impl Into<String>,
        brand: impl Into<String>,
        release_date: impl Into<String>,
        url: impl Into<String>,
        specs: BTreeMap<String, String>,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            brand: brand.into(),
            release_date: release_date.into(),
            url: url.into(),
            specs,
            crawled_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Append-only destination for harvested records
///
/// Implementations must be thread-safe; workers emit concurrently.
pub trait RecordSink: Send + Sync {
    /// Appends one record
    ///
    /// When this returns `Ok`, the record is durably committed, so the
    /// caller may mark the target visited.
    fn emit(&self, record: &PhoneRecord) -> OutputResult<()>;

    /// Flushes buffered output
    fn flush(&self) -> OutputResult<()>;

    /// Flushes and releases the sink; later calls are no-ops
    fn close(&self) -> OutputResult<()>;

    /// Number of records emitted through this sink
    fn emitted(&self) -> u64;
}
