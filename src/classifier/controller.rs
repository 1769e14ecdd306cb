//! Applies a classification to the proxy pool and dedup store

use crate::classifier::retry::RetryPolicy;
use crate::classifier::rules::{classify, Disposition, FetchOutcome};
use crate::proxy::ProxyPool;
use crate::storage::DedupStore;
use std::sync::Arc;
use std::time::Duration;

/// What the caller should do next with the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The response is good; process it
    Proceed,
    /// Re-enqueue the target after `delay`
    Retry { delay: Duration },
    /// The target was recorded as visited without processing
    Marked,
    /// The attempt was dropped; the target stays eligible for future runs
    Dropped,
}

/// Binds the classifier to its side effects
///
/// Retryable outcomes evict the proxy that served the attempt, absent
/// targets are marked in the dedup store, and everything else is logged.
#[derive(Clone)]
pub struct RetryController {
    pool: ProxyPool,
    store: Arc<dyn DedupStore>,
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(pool: ProxyPool, store: Arc<dyn DedupStore>, policy: RetryPolicy) -> Self {
        Self {
            pool,
            store,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Classifies `outcome` and performs the matching side effects
    ///
    /// # Arguments
    ///
    /// * `outcome` - Result of the attempt
    /// * `attempt` - 1-based number of the attempt that produced `outcome`
    ///
    /// # Returns
    ///
    /// The next step for the target
    pub fn resolve(&self, outcome: &FetchOutcome, attempt: u32) -> Resolution {
        let disposition = classify(outcome);

        match disposition {
            Disposition::Success => Resolution::Proceed,

            Disposition::Retryable(kind) => {
                if let Some(proxy) = &outcome.proxy {
                    self.pool.evict(proxy);
                }

                if !self.policy.allows_retry(attempt) {
                    tracing::warn!(
                        url = %outcome.target,
                        attempt,
                        kind = %kind,
                        "Retry budget exhausted, dropping target"
                    );
                    return Resolution::Dropped;
                }

                tracing::info!(
                    url = %outcome.target,
                    status = outcome.status,
                    kind = %kind,
                    attempt,
                    "Evicted proxy, retrying"
                );
                Resolution::Retry {
                    delay: self.policy.delay_for(attempt),
                }
            }

            Disposition::SkipAndMark => {
                tracing::info!(url = %outcome.target, status = outcome.status, "Target absent, marking visited");
                if let Err(e) = self.store.mark_visited(&outcome.target) {
                    tracing::warn!(url = %outcome.target, error = %e, "Failed to mark absent target");
                }
                Resolution::Marked
            }

            Disposition::SkipNoMark => {
                tracing::warn!(
                    url = %outcome.target,
                    status = outcome.status,
                    error = outcome.error.as_deref().unwrap_or(""),
                    "Unclassified failure, not retrying"
                );
                Resolution::Dropped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{ProxyAddress, ProxyError, ProxyResult, ProxySupplier};
    use crate::storage::SqliteDedupStore;
    use async_trait::async_trait;

    const TARGET: &str = "https://www.gsmarena.com/samsung_galaxy_s24-12773.php";

    struct UnreachableSupplier;

    #[async_trait]
    impl ProxySupplier for UnreachableSupplier {
        async fn fetch_list(&self) -> ProxyResult<String> {
            Err(ProxyError::SupplierStatus { status: 502 })
        }

        fn describe(&self) -> String {
            "unreachable".to_string()
        }
    }

    fn addr(raw: &str) -> ProxyAddress {
        ProxyAddress::parse(raw).unwrap()
    }

    fn setup(policy: RetryPolicy) -> (RetryController, ProxyPool, Arc<SqliteDedupStore>) {
        let pool = ProxyPool::with_addresses(
            Arc::new(UnreachableSupplier),
            1,
            vec![addr("1.1.1.1:80"), addr("2.2.2.2:80")],
        );
        let store = Arc::new(SqliteDedupStore::new_in_memory().unwrap());
        let controller = RetryController::new(pool.clone(), store.clone(), policy);
        (controller, pool, store)
    }

    #[test]
    fn test_rate_limited_evicts_and_retries() {
        let (controller, pool, store) = setup(RetryPolicy::default());
        let outcome = FetchOutcome::from_status(TARGET, Some(addr("1.1.1.1:80")), 429);

        let resolution = controller.resolve(&outcome, 1);

        assert_eq!(resolution, Resolution::Retry { delay: Duration::ZERO });
        assert_eq!(pool.snapshot(), vec![addr("2.2.2.2:80")]);
        assert!(!store.is_visited(TARGET));
    }

    #[test]
    fn test_timeout_evicts_and_retries() {
        let (controller, pool, _store) = setup(RetryPolicy::default());
        let outcome = FetchOutcome::from_error(TARGET, Some(addr("2.2.2.2:80")), "request timeout");

        assert!(matches!(
            controller.resolve(&outcome, 1),
            Resolution::Retry { .. }
        ));
        assert!(!pool.contains(&addr("2.2.2.2:80")));
    }

    #[test]
    fn test_not_found_marks_without_eviction() {
        let (controller, pool, store) = setup(RetryPolicy::default());
        let outcome = FetchOutcome::from_status(TARGET, Some(addr("1.1.1.1:80")), 404);

        assert_eq!(controller.resolve(&outcome, 1), Resolution::Marked);
        assert!(store.is_visited(TARGET));
        assert_eq!(pool.count(), 2);
    }

    #[test]
    fn test_unclassified_drops_without_eviction_or_mark() {
        let (controller, pool, store) = setup(RetryPolicy::default());
        let mut outcome = FetchOutcome::from_status(TARGET, Some(addr("1.1.1.1:80")), 500);
        outcome.error = Some("Internal Server Error".to_string());

        assert_eq!(controller.resolve(&outcome, 1), Resolution::Dropped);
        assert_eq!(pool.count(), 2);
        assert!(!store.is_visited(TARGET));
    }

    #[test]
    fn test_success_proceeds_untouched() {
        let (controller, pool, store) = setup(RetryPolicy::default());
        let outcome = FetchOutcome::from_status(TARGET, Some(addr("1.1.1.1:80")), 200);

        assert_eq!(controller.resolve(&outcome, 1), Resolution::Proceed);
        assert_eq!(pool.count(), 2);
        assert!(!store.is_visited(TARGET));
    }

    #[test]
    fn test_exhausted_budget_still_evicts() {
        let policy = RetryPolicy {
            max_attempts: Some(2),
            base_ms: 100,
            factor: 2.0,
            max_ms: 1_000,
            jitter: false,
        };
        let (controller, pool, _store) = setup(policy);

        let first = FetchOutcome::from_status(TARGET, Some(addr("1.1.1.1:80")), 503);
        assert_eq!(
            controller.resolve(&first, 1),
            Resolution::Retry {
                delay: Duration::from_millis(100)
            }
        );

        let second = FetchOutcome::from_status(TARGET, Some(addr("2.2.2.2:80")), 503);
        assert_eq!(controller.resolve(&second, 2), Resolution::Dropped);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_mark_failure_is_not_fatal() {
        let (controller, _pool, store) = setup(RetryPolicy::default());
        store.close().unwrap();

        let outcome = FetchOutcome::from_status(TARGET, None, 404);
        assert_eq!(controller.resolve(&outcome, 1), Resolution::Marked);
    }
}
