//! Statistics generation from the dedup store and records file
//!
//! This module provides functionality for extracting and displaying
//! harvest statistics.

use crate::harvest::HarvestSummary;
use crate::output::jsonl::count_records;
use crate::storage::DedupStore;
use crate::HarvestError;
use std::path::Path;

/// Harvest statistics summary
#[derive(Debug, Clone, Default)]
pub struct HarvestStatistics {
    /// Keys recorded in the dedup store
    pub visited_count: u64,

    /// Proxies left in the pool, when a pool exists
    pub proxies_remaining: Option<usize>,

    /// Path of the records file
    pub records_path: String,

    /// Lines currently in the records file
    pub records_in_file: u64,

    /// Counters of the run that just finished, if any
    pub run: Option<HarvestSummary>,
}

/// Loads statistics from the dedup store and the records file
///
/// # Arguments
///
/// * `store` - The dedup store to query
/// * `records_path` - Path of the JSON-lines output
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query the store or read the file
pub fn load_statistics(
    store: &dyn DedupStore,
    records_path: &Path,
) -> Result<HarvestStatistics, HarvestError> {
    let visited_count = store.visited_count()?;
    let records_in_file = count_records(records_path)?;

    Ok(HarvestStatistics {
        visited_count,
        proxies_remaining: None,
        records_path: records_path.display().to_string(),
        records_in_file,
        run: None,
    })
}

/// Prints statistics to stdout
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  Visited URLs: {}", stats.visited_count);
    if let Some(proxies) = stats.proxies_remaining {
        println!("  Proxies remaining: {}", proxies);
    }
    println!("  Records file: {}", stats.records_path);
    println!("  Records in file: {}", stats.records_in_file);
    println!();

    if let Some(run) = &stats.run {
        println!("This Run:");
        println!("  Attempts: {}", run.attempts);
        println!("  Responses processed: {}", run.fetched);
        println!("  Records emitted: {}", run.emitted);
        println!("  Retried: {}", run.retried);
        println!("  Marked without processing: {}", run.marked_absent);
        println!("  Dropped: {}", run.dropped);
        println!("  Skipped as visited: {}", run.skipped_visited);
        if run.cancelled {
            println!("  (interrupted before the frontier drained)");
        }
        println!();

        let success_rate = if run.attempts > 0 {
            (run.fetched as f64 / run.attempts as f64) * 100.0
        } else {
            0.0
        };
        println!(
            "Success Rate: {:.1}% ({} / {} attempts processed)",
            success_rate, run.fetched, run.attempts
        );
    }
}
