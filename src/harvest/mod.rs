//! Harvest module for fetching and processing catalogue pages
//!
//! This module contains the harvest pipeline, including:
//! - Targets and the stage each page is processed in
//! - The per-run frontier shared by the workers
//! - Proxy-aware HTTP fetching with header rotation
//! - HTML extraction of follow-up links and phone records
//! - The resource bundle and the worker orchestration

mod context;
mod extract;
mod fetcher;
mod frontier;
mod orchestrator;
mod target;

pub use context::HarvestContext;
pub use extract::{
    brand_from_url, extract_brand_links, extract_listing, extract_phone, is_allowed_host,
    release_date, resolve_link, ListingPage, UNKNOWN,
};
pub use fetcher::{FetchError, FetchResponse, Fetcher, ReqwestFetcher};
pub use frontier::{Frontier, Lease};
pub use orchestrator::{HarvestSettings, HarvestSummary, Orchestrator};
pub use target::{Stage, Target};

use crate::classifier::RetryPolicy;
use crate::config::Config;
use crate::output::HarvestStatistics;
use crate::{HarvestError, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Builds the initial targets from the configured seed URLs
pub fn seed_targets(config: &Config) -> Vec<Target> {
    config
        .harvester
        .seed_urls
        .iter()
        .map(|url| Target::seed(url.as_str()))
        .collect()
}

/// Runs a complete harvest
///
/// This is the main entry point for a harvest. It will:
/// 1. Open the dedup store and records file and load the proxy pool
/// 2. Walk the catalogue from the seed URLs until the frontier drains
///    or `cancel` fires
/// 3. Collect statistics and close every resource exactly once
///
/// # Arguments
///
/// * `config` - The validated configuration
/// * `cancel` - Shutdown signal
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Harvest finished or was interrupted cleanly
/// * `Err(HarvestError)` - Initialization failed, or resources failed to close
pub async fn run_harvest(config: &Config, cancel: CancellationToken) -> Result<HarvestStatistics> {
    let context = HarvestContext::initialize(config).await?;

    let fetcher = ReqwestFetcher::new(&config.harvester)
        .map_err(|e| HarvestError::initialization("http fetcher", e))?;

    let orchestrator = Orchestrator::new(
        &context,
        Arc::new(fetcher),
        HarvestSettings::from(&config.harvester),
        RetryPolicy::from(&config.retry),
    );

    let summary = orchestrator.run(seed_targets(config), cancel).await;

    let mut stats = crate::output::load_statistics(
        context.store.as_ref(),
        std::path::Path::new(&config.output.records_path),
    )
    .unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to collect statistics");
        HarvestStatistics {
            records_path: config.output.records_path.clone(),
            ..HarvestStatistics::default()
        }
    });
    stats.proxies_remaining = Some(context.pool.count());
    stats.run = Some(summary);

    context.close()?;
    Ok(stats)
}
