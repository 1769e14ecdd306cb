//! Harvest orchestration
//!
//! Workers pull targets from the frontier and, for each one:
//! 1. Skip it if the dedup store already has it
//! 2. Wait out the politeness delay and acquire a proxy
//! 3. Fetch, then let the retry controller resolve the outcome
//! 4. On success, extract follow-up targets or a record; records are
//!    durably emitted before the target is marked visited

use crate::classifier::{FetchOutcome, Resolution, RetryController, RetryPolicy};
use crate::config::HarvesterConfig;
use crate::harvest::context::HarvestContext;
use crate::harvest::extract::{extract_brand_links, extract_listing, extract_phone, is_allowed_host};
use crate::harvest::fetcher::{FetchResponse, Fetcher};
use crate::harvest::frontier::Frontier;
use crate::harvest::target::{Stage, Target};
use crate::output::RecordSink;
use crate::proxy::ProxyPool;
use crate::storage::DedupStore;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Scheduling knobs taken from the `[harvester]` section
#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub parallelism: usize,
    pub delay: Duration,
    pub random_delay: Duration,
    pub allowed_domains: Vec<String>,
}

impl From<&HarvesterConfig> for HarvestSettings {
    fn from(config: &HarvesterConfig) -> Self {
        Self {
            parallelism: config.parallelism.max(1) as usize,
            delay: Duration::from_millis(config.delay_ms),
            random_delay: Duration::from_millis(config.random_delay_ms),
            allowed_domains: config.allowed_domains.clone(),
        }
    }
}

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    /// Fetches issued
    pub attempts: u64,
    /// Responses classified as success and processed
    pub fetched: u64,
    /// Records written to the sink
    pub emitted: u64,
    /// Attempts re-enqueued after a retryable failure
    pub retried: u64,
    /// Targets marked visited without processing
    pub marked_absent: u64,
    /// Attempts dropped without marking
    pub dropped: u64,
    /// Targets skipped because the dedup store already had them
    pub skipped_visited: u64,
    /// True if the run stopped on cancellation
    pub cancelled: bool,
}

#[derive(Debug, Default)]
struct Counters {
    attempts: AtomicU64,
    fetched: AtomicU64,
    emitted: AtomicU64,
    retried: AtomicU64,
    marked_absent: AtomicU64,
    dropped: AtomicU64,
    skipped_visited: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> HarvestSummary {
        HarvestSummary {
            attempts: self.attempts.load(Ordering::Relaxed),
            fetched: self.fetched.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            marked_absent: self.marked_absent.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            skipped_visited: self.skipped_visited.load(Ordering::Relaxed),
            cancelled: false,
        }
    }
}

struct Shared {
    fetcher: Arc<dyn Fetcher>,
    pool: ProxyPool,
    store: Arc<dyn DedupStore>,
    sink: Arc<dyn RecordSink>,
    controller: RetryController,
    settings: HarvestSettings,
}

/// Runs targets through fetch, classification and extraction
#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<Shared>,
}

impl Orchestrator {
    /// Creates an orchestrator over the context's resources
    ///
    /// # Arguments
    ///
    /// * `context` - Store, sink and proxy pool
    /// * `fetcher` - Transport used for every attempt
    /// * `settings` - Worker count, delays and allowed hosts
    /// * `policy` - Retry budget and backoff
    pub fn new(
        context: &HarvestContext,
        fetcher: Arc<dyn Fetcher>,
        settings: HarvestSettings,
        policy: RetryPolicy,
    ) -> Self {
        let controller = RetryController::new(context.pool.clone(), Arc::clone(&context.store), policy);

        Self {
            shared: Arc::new(Shared {
                fetcher,
                pool: context.pool.clone(),
                store: Arc::clone(&context.store),
                sink: Arc::clone(&context.sink),
                controller,
                settings,
            }),
        }
    }

    /// Harvests from `seeds` until the frontier drains or `cancel` fires
    ///
    /// On cancellation, workers stop taking new targets and finish the
    /// attempt they are on. The sink is flushed before returning.
    pub async fn run(&self, seeds: Vec<Target>, cancel: CancellationToken) -> HarvestSummary {
        let frontier = Arc::new(Frontier::new());
        for seed in seeds {
            frontier.push(seed);
        }

        let counters = Arc::new(Counters::default());
        let parallelism = self.shared.settings.parallelism;

        tracing::info!(
            workers = parallelism,
            seeds = frontier.pending(),
            proxies = self.shared.pool.count(),
            "Starting harvest"
        );

        let mut workers = JoinSet::new();
        for id in 1..=parallelism {
            let worker = Worker {
                id,
                shared: Arc::clone(&self.shared),
                frontier: Arc::clone(&frontier),
                counters: Arc::clone(&counters),
                cancel: cancel.clone(),
            };
            workers.spawn(worker.run());
        }

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "A harvest worker panicked or was aborted");
            }
        }

        if let Err(e) = self.shared.sink.flush() {
            tracing::warn!(error = %e, "Failed to flush record sink");
        }

        let mut summary = counters.snapshot();
        summary.cancelled = cancel.is_cancelled();

        tracing::info!(
            attempts = summary.attempts,
            emitted = summary.emitted,
            retried = summary.retried,
            dropped = summary.dropped,
            skipped = summary.skipped_visited,
            cancelled = summary.cancelled,
            "Harvest finished"
        );

        summary
    }
}

struct Worker {
    id: usize,
    shared: Arc<Shared>,
    frontier: Arc<Frontier>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) {
        tracing::debug!(worker = self.id, "Worker started");

        while let Some(lease) = self.frontier.next(&self.cancel).await {
            self.process(lease.target()).await;
        }

        tracing::debug!(worker = self.id, "Worker stopped");
    }

    async fn process(&self, target: &Target) {
        if self.shared.store.is_visited(&target.url) {
            tracing::debug!(url = %target.url, "Already visited, skipping");
            Counters::bump(&self.counters.skipped_visited);
            return;
        }

        // Nothing has been sent yet, so a shutdown here abandons the target
        if !self.politeness_delay().await {
            return;
        }

        let proxy = match self.shared.pool.acquire().await {
            Ok(proxy) => proxy,
            Err(e) => {
                tracing::warn!(url = %target.url, error = %e, "No proxy for request, dropping attempt");
                Counters::bump(&self.counters.dropped);
                return;
            }
        };

        tracing::info!(
            url = %target.url,
            stage = %target.stage,
            attempt = target.attempt,
            proxy = %proxy,
            "Requesting"
        );
        Counters::bump(&self.counters.attempts);

        let (outcome, response) = match self.shared.fetcher.fetch(&target.url, &proxy).await {
            Ok(response) => (
                FetchOutcome::from_status(target.url.clone(), Some(proxy), response.status),
                Some(response),
            ),
            Err(e) => (
                FetchOutcome {
                    target: target.url.clone(),
                    proxy: Some(proxy),
                    status: e.status(),
                    error: Some(e.to_string()),
                },
                None,
            ),
        };

        match self.shared.controller.resolve(&outcome, target.attempt) {
            Resolution::Proceed => {
                Counters::bump(&self.counters.fetched);
                if let Some(response) = response {
                    self.handle_page(target, &response);
                }
            }
            Resolution::Retry { delay } => {
                Counters::bump(&self.counters.retried);
                if !delay.is_zero() {
                    tokio::select! {
                        _ = self.cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                self.frontier.push_retry(target.next_attempt());
            }
            Resolution::Marked => Counters::bump(&self.counters.marked_absent),
            Resolution::Dropped => Counters::bump(&self.counters.dropped),
        }
    }

    /// Sleeps the fixed plus random delay; false if cancelled meanwhile
    async fn politeness_delay(&self) -> bool {
        let delay = self.next_delay();
        if delay.is_zero() {
            return !self.cancel.is_cancelled();
        }

        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    fn next_delay(&self) -> Duration {
        let settings = &self.shared.settings;
        let random_ms = settings.random_delay.as_millis() as u64;
        let extra = if random_ms > 0 {
            rand::thread_rng().gen_range(0..random_ms)
        } else {
            0
        };
        settings.delay + Duration::from_millis(extra)
    }

    fn handle_page(&self, target: &Target, response: &FetchResponse) {
        let base = match Url::parse(&response.final_url).or_else(|_| Url::parse(&target.url)) {
            Ok(base) => base,
            Err(e) => {
                tracing::warn!(url = %target.url, error = %e, "Unparsable page URL");
                return;
            }
        };

        match target.stage {
            Stage::Discovery => {
                let mut queued = 0;
                for link in extract_brand_links(&response.body, &base) {
                    if self.is_allowed(&link) && self.frontier.push(Target::listing(link)) {
                        queued += 1;
                    }
                }
                tracing::info!(url = %target.url, brands = queued, "Discovered brand listings");
            }

            Stage::Listing => {
                let listing = extract_listing(&response.body, &base);
                for phone in listing.phones {
                    if !self.is_allowed(&phone) {
                        continue;
                    }
                    if self.shared.store.is_visited(&phone) {
                        tracing::debug!(url = %phone, "Already visited, not queueing");
                        Counters::bump(&self.counters.skipped_visited);
                        continue;
                    }
                    self.frontier.push(Target::detail(phone, target.brand.clone()));
                }

                if let Some(next) = listing.next_page.filter(|n| self.is_allowed(n)) {
                    tracing::debug!(url = %next, "Following next listing page");
                    let mut next_target = Target::listing(next);
                    if next_target.brand.is_none() {
                        next_target.brand = target.brand.clone();
                    }
                    self.frontier.push(next_target);
                }
            }

            Stage::Detail => self.handle_detail(target, &response.body),
        }
    }

    fn handle_detail(&self, target: &Target, body: &str) {
        // Another worker may have finished the same page meanwhile
        if self.shared.store.is_visited(&target.url) {
            Counters::bump(&self.counters.skipped_visited);
            return;
        }

        let Some(record) = extract_phone(body, &target.url, target.brand.as_deref()) else {
            tracing::warn!(url = %target.url, "No specification table on detail page");
            return;
        };

        if let Err(e) = self.shared.sink.emit(&record) {
            tracing::error!(url = %target.url, error = %e, "Failed to write record, leaving unmarked");
            return;
        }
        Counters::bump(&self.counters.emitted);

        match self.shared.store.mark_visited(&target.url) {
            Ok(()) => tracing::info!(url = %target.url, "Harvested and marked"),
            Err(e) => tracing::error!(url = %target.url, error = %e, "Failed to mark visited"),
        }
    }

    fn is_allowed(&self, url: &str) -> bool {
        is_allowed_host(url, &self.shared.settings.allowed_domains)
    }
}
