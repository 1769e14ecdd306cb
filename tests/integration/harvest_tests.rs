//! Integration tests for a harvest run
//!
//! These tests drive the orchestrator with a scripted fetcher, a real
//! SQLite dedup store on disk and an in-memory record sink.

use async_trait::async_trait;
use phone_harvest::classifier::{classify, Disposition, FailureKind, FetchOutcome, RetryPolicy};
use phone_harvest::config::HarvesterConfig;
use phone_harvest::harvest::{
    FetchError, FetchResponse, Fetcher, HarvestContext, HarvestSettings, Orchestrator,
    ReqwestFetcher, Target,
};
use phone_harvest::output::{MemorySink, RecordSink};
use phone_harvest::proxy::{ProxyAddress, ProxyError, ProxyPool, ProxyResult, ProxySupplier};
use phone_harvest::storage::{DedupStore, SqliteDedupStore};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const PHONE_URL: &str = "https://www.gsmarena.com/apple_iphone_15-12559.php";

const PHONE_HTML: &str = r#"<html><body>
    <h1 class="specs-phone-name-title">Apple iPhone 15</h1>
    <div id="specs-list"><table>
      <tr><td class="ttl">Status</td><td class="nfo">Available. Released 2023, September 22</td></tr>
      <tr><td class="ttl">Weight</td><td class="nfo">171 g</td></tr>
    </table></div>
    </body></html>"#;

/// Supplier that never answers within the test
#[derive(Default)]
struct SlowSupplier {
    calls: AtomicUsize,
}

impl SlowSupplier {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProxySupplier for SlowSupplier {
    async fn fetch_list(&self) -> ProxyResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(ProxyError::EmptyList)
    }

    fn describe(&self) -> String {
        "slow".to_string()
    }
}

/// Answers 429 through the blocked proxy and the phone page through any other
struct ScriptedFetcher {
    blocked: ProxyAddress,
    requests: Mutex<Vec<(String, String)>>,
}

impl ScriptedFetcher {
    fn new(blocked: &ProxyAddress) -> Self {
        Self {
            blocked: blocked.clone(),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, proxy: &ProxyAddress) -> Result<FetchResponse, FetchError> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), proxy.to_string()));

        let (status, body) = if proxy == &self.blocked {
            (429, String::new())
        } else {
            (200, PHONE_HTML.to_string())
        };
        Ok(FetchResponse {
            status,
            final_url: url.to_string(),
            body,
        })
    }
}

fn settings() -> HarvestSettings {
    HarvestSettings {
        parallelism: 1,
        delay: Duration::ZERO,
        random_delay: Duration::ZERO,
        allowed_domains: vec!["www.gsmarena.com".to_string()],
    }
}

fn no_backoff() -> RetryPolicy {
    RetryPolicy {
        base_ms: 0,
        ..RetryPolicy::default()
    }
}

fn open_store(dir: &TempDir) -> Arc<SqliteDedupStore> {
    Arc::new(
        SqliteDedupStore::open(&dir.path().join("crawler.db"), "visited_urls")
            .expect("Failed to open store"),
    )
}

#[tokio::test]
async fn test_blocked_proxy_is_evicted_and_target_retried() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let blocked = ProxyAddress::parse("1.1.1.1:80").unwrap();
    let healthy = ProxyAddress::parse("2.2.2.2:80").unwrap();

    // First run: the first proxy is rate limited, the second one succeeds
    let store = open_store(&dir);
    let sink = Arc::new(MemorySink::new());
    let supplier = Arc::new(SlowSupplier::default());
    let pool = ProxyPool::with_addresses(
        supplier.clone(),
        2,
        vec![blocked.clone(), healthy.clone()],
    );
    let context = HarvestContext::new(store.clone(), sink.clone(), pool.clone());
    let fetcher = Arc::new(ScriptedFetcher::new(&blocked));

    let orchestrator = Orchestrator::new(&context, fetcher.clone(), settings(), no_backoff());
    let summary = tokio::time::timeout(
        Duration::from_secs(10),
        orchestrator.run(
            vec![Target::detail(PHONE_URL, Some("Apple".to_string()))],
            CancellationToken::new(),
        ),
    )
    .await
    .expect("Harvest should not wait for the proxy supplier");

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].model_name, "Apple iPhone 15");
    assert_eq!(records[0].brand, "Apple");
    assert_eq!(records[0].release_date, "2023, September 22");
    assert_eq!(records[0].url, PHONE_URL);

    assert!(store.is_visited(PHONE_URL));
    assert!(!pool.contains(&blocked));
    assert!(pool.contains(&healthy));
    assert_eq!(pool.eviction_count(), 1);

    // Dropping below the watermark started one background refresh, which
    // is still waiting on the supplier
    assert!(pool.is_refreshing());
    tokio::time::timeout(Duration::from_secs(5), async {
        while supplier.calls() == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("Background refresh should reach the supplier");
    assert_eq!(supplier.calls(), 1);
    assert_eq!(pool.replenishment_count(), 0);

    assert_eq!(summary.attempts, 2);
    assert_eq!(summary.retried, 1);
    assert_eq!(summary.emitted, 1);
    assert_eq!(
        fetcher.requests(),
        vec![
            (PHONE_URL.to_string(), blocked.to_string()),
            (PHONE_URL.to_string(), healthy.to_string()),
        ]
    );

    context.close().expect("Failed to close context");
    drop(context);
    drop(store);

    // Second run against the reopened store: nothing left to fetch
    let store = open_store(&dir);
    let sink = Arc::new(MemorySink::new());
    let pool = ProxyPool::with_addresses(Arc::new(SlowSupplier::default()), 1, vec![healthy.clone()]);
    let context = HarvestContext::new(store.clone(), sink.clone(), pool);
    let fetcher = Arc::new(ScriptedFetcher::new(&blocked));

    let orchestrator = Orchestrator::new(&context, fetcher.clone(), settings(), no_backoff());
    let summary = orchestrator
        .run(
            vec![Target::detail(PHONE_URL, Some("Apple".to_string()))],
            CancellationToken::new(),
        )
        .await;

    assert!(fetcher.requests().is_empty());
    assert_eq!(summary.skipped_visited, 1);
    assert_eq!(sink.emitted(), 0);
}

#[tokio::test]
async fn test_bounded_retries_give_up_without_marking() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let blocked = ProxyAddress::parse("1.1.1.1:80").unwrap();

    let store = open_store(&dir);
    let sink = Arc::new(MemorySink::new());
    // The supplier never answers, so the evicted proxy is not replaced
    let pool = ProxyPool::with_addresses(Arc::new(SlowSupplier::default()), 1, vec![blocked.clone()]);
    let context = HarvestContext::new(store.clone(), sink.clone(), pool.clone());
    let fetcher = Arc::new(ScriptedFetcher::new(&blocked));

    let policy = RetryPolicy {
        max_attempts: Some(1),
        ..no_backoff()
    };
    let orchestrator = Orchestrator::new(&context, fetcher.clone(), settings(), policy);
    let summary = orchestrator
        .run(
            vec![Target::detail(PHONE_URL, None)],
            CancellationToken::new(),
        )
        .await;

    assert_eq!(summary.attempts, 1);
    assert_eq!(summary.dropped, 1);
    assert_eq!(summary.retried, 0);
    assert!(!store.is_visited(PHONE_URL));
    assert!(!pool.contains(&blocked));
    assert!(sink.records().is_empty());
}

#[tokio::test]
async fn test_dead_proxy_is_a_transient_transport_failure() {
    let config = HarvesterConfig {
        seed_urls: vec![PHONE_URL.to_string()],
        allowed_domains: vec![],
        parallelism: 1,
        delay_ms: 0,
        random_delay_ms: 0,
        request_timeout_secs: 5,
        user_agents: vec!["TestAgent/1.0".to_string()],
    };
    let fetcher = ReqwestFetcher::new(&config).expect("Failed to build fetcher");

    // Nothing listens on port 9 of the loopback interface
    let dead = ProxyAddress::parse("127.0.0.1:9").unwrap();
    let err = fetcher
        .fetch("http://www.gsmarena.com/makers.php3", &dead)
        .await
        .expect_err("Fetching through a dead proxy should fail");

    assert_eq!(err.status(), 0);

    let outcome = FetchOutcome {
        target: "http://www.gsmarena.com/makers.php3".to_string(),
        proxy: Some(dead),
        status: err.status(),
        error: Some(err.to_string()),
    };
    assert_eq!(
        classify(&outcome),
        Disposition::Retryable(FailureKind::TransportTransient)
    );
}

#[test]
fn test_store_survives_reopen_without_close() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db = dir.path().join("crawler.db");

    {
        let store = SqliteDedupStore::open(&db, "visited_urls").unwrap();
        store.mark_visited(PHONE_URL).unwrap();
        // Dropped without close, as after a crash
    }

    let store = SqliteDedupStore::open(Path::new(&db), "visited_urls").unwrap();
    assert!(store.is_visited(PHONE_URL));
    assert_eq!(store.visited_count().unwrap(), 1);
}
