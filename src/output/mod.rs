//! Output module for harvested records and run reports
//!
//! This module handles:
//! - The `PhoneRecord` structure written per harvested phone
//! - Durable JSON-lines sinks
//! - Harvest statistics

mod jsonl;
pub mod stats;
mod traits;

pub use jsonl::{count_records, JsonLinesSink, MemorySink};
pub use stats::{load_statistics, print_statistics, HarvestStatistics};
pub use traits::{OutputError, OutputResult, PhoneRecord, RecordSink};

use crate::config::OutputConfig;
use std::path::Path;

/// Opens the records file described by the `[output]` section
pub fn open_sink(config: &OutputConfig) -> OutputResult<JsonLinesSink> {
    JsonLinesSink::open(Path::new(&config.records_path))
}
