//! Round-robin proxy pool with watermark-triggered replenishment
//!
//! Locking layout:
//! - `state` (RwLock) guards the address list and cursor. It is never held
//!   across an `.await`, so supplier calls never block readers.
//! - `refreshing` (Mutex<bool>) is the single-flight flag for background
//!   refreshes. It is separate from `state` and only held to flip the flag.
//! - `blocking_refill` (async Mutex) serializes empty-pool refills so that a
//!   burst of workers hitting an empty pool produces one supplier call.

use crate::proxy::{parse_proxy_list, ProxyAddress, ProxyError, ProxyResult, ProxySupplier};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::runtime::Handle;

#[derive(Debug, Default)]
struct PoolState {
    /// Insertion order of the last successful replenishment
    addresses: Vec<ProxyAddress>,
    /// Always `< addresses.len()` while the pool is non-empty, 0 otherwise
    cursor: usize,
}

struct Shared {
    supplier: Arc<dyn ProxySupplier>,
    watermark: usize,
    state: RwLock<PoolState>,
    refreshing: Mutex<bool>,
    blocking_refill: tokio::sync::Mutex<()>,
    replenishments: AtomicU64,
    evictions: AtomicU64,
}

impl Shared {
    fn lock_refreshing(&self) -> MutexGuard<'_, bool> {
        self.refreshing.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the single-flight flag when the background refresh ends,
/// including when the task is dropped or panics.
struct RefreshGuard {
    shared: Arc<Shared>,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        *self.shared.lock_refreshing() = false;
    }
}

/// Shared handle to the process-wide proxy pool
///
/// Cloning is cheap; all clones see the same addresses.
#[derive(Clone)]
pub struct ProxyPool {
    shared: Arc<Shared>,
}

impl ProxyPool {
    /// Creates a pool and performs the initial synchronous load
    ///
    /// A failed initial load is logged, not fatal: the pool starts empty and
    /// the first `acquire` retries the supplier.
    pub async fn connect(supplier: Arc<dyn ProxySupplier>, watermark: usize) -> Self {
        let pool = Self::with_addresses(supplier, watermark, Vec::new());
        tracing::info!(supplier = %pool.shared.supplier.describe(), "Initializing proxy pool");

        match pool.replenish().await {
            Ok(count) => tracing::info!(count, "Proxy pool initialized"),
            Err(e) => tracing::warn!(error = %e, "Initial proxy load failed, pool starts empty"),
        }

        pool
    }

    /// Creates a pool seeded with `addresses` without calling the supplier
    pub fn with_addresses(
        supplier: Arc<dyn ProxySupplier>,
        watermark: usize,
        addresses: Vec<ProxyAddress>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                supplier,
                watermark,
                state: RwLock::new(PoolState {
                    addresses,
                    cursor: 0,
                }),
                refreshing: Mutex::new(false),
                blocking_refill: tokio::sync::Mutex::new(()),
                replenishments: AtomicU64::new(0),
                evictions: AtomicU64::new(0),
            }),
        }
    }

    /// Returns the next proxy in round-robin order
    ///
    /// An empty pool is refilled synchronously before selecting; the caller
    /// waits for that supplier call. A non-empty pool below the watermark
    /// schedules a background refresh and returns immediately.
    ///
    /// # Returns
    ///
    /// * `Ok(ProxyAddress)` - The proxy to use for this attempt
    /// * `Err(ProxyError::NoProxyAvailable)` - The pool is empty and the refill yielded nothing
    pub async fn acquire(&self) -> ProxyResult<ProxyAddress> {
        if self.is_empty() {
            self.refill_empty().await;
        }

        let (address, size) = {
            let mut state = self.write_state();
            let size = state.addresses.len();
            if size == 0 {
                return Err(ProxyError::NoProxyAvailable);
            }

            let address = state.addresses[state.cursor].clone();
            state.cursor = (state.cursor + 1) % size;
            (address, size)
        };

        if size < self.shared.watermark {
            self.trigger_refresh();
        }

        Ok(address)
    }

    /// Removes the first occurrence of `address` from the pool
    ///
    /// Returns false (and logs) when the address is not present, in which
    /// case neither the contents nor the cursor change. Dropping below the
    /// watermark schedules a background refresh.
    pub fn evict(&self, address: &ProxyAddress) -> bool {
        let remaining = {
            let mut state = self.write_state();
            match state.addresses.iter().position(|a| a == address) {
                Some(position) => {
                    state.addresses.remove(position);
                    // Keep pointing at the same next-in-line proxy
                    if position < state.cursor {
                        state.cursor -= 1;
                    }
                    if state.cursor >= state.addresses.len() {
                        state.cursor = 0;
                    }
                    Some(state.addresses.len())
                }
                None => None,
            }
        };

        let Some(remaining) = remaining else {
            tracing::warn!(proxy = %address, "Proxy to evict is not in the pool");
            return false;
        };

        self.shared.evictions.fetch_add(1, Ordering::Relaxed);
        tracing::info!(proxy = %address, remaining, "Evicted failing proxy");

        if remaining < self.shared.watermark {
            self.trigger_refresh();
        }

        true
    }

    /// Fetches a fresh list from the supplier and replaces the pool with it
    ///
    /// The replacement is atomic with respect to `acquire`/`evict` and resets
    /// the cursor. On any failure, including a list with no usable entries,
    /// the previous contents are kept.
    ///
    /// # Returns
    ///
    /// The number of proxies now in the pool
    pub async fn replenish(&self) -> ProxyResult<usize> {
        let body = self.shared.supplier.fetch_list().await?;
        let addresses = parse_proxy_list(&body);
        if addresses.is_empty() {
            return Err(ProxyError::EmptyList);
        }

        let count = addresses.len();
        {
            let mut state = self.write_state();
            state.addresses = addresses;
            state.cursor = 0;
        }

        self.shared.replenishments.fetch_add(1, Ordering::Relaxed);
        tracing::info!(count, "Proxy pool replenished");
        Ok(count)
    }

    /// Starts a background replenishment unless one is already in flight
    ///
    /// Never waits for the supplier. Returns true if this call started a
    /// refresh. Outside a tokio runtime the refresh is skipped.
    pub fn trigger_refresh(&self) -> bool {
        let Ok(handle) = Handle::try_current() else {
            tracing::warn!("No async runtime available, skipping background proxy refresh");
            return false;
        };

        {
            let mut refreshing = self.shared.lock_refreshing();
            if *refreshing {
                tracing::debug!("Proxy refresh already in flight");
                return false;
            }
            *refreshing = true;
        }

        let guard = RefreshGuard {
            shared: Arc::clone(&self.shared),
        };
        let pool = self.clone();

        tracing::info!(
            size = self.count(),
            watermark = self.shared.watermark,
            "Proxy pool below watermark, refreshing in background"
        );

        handle.spawn(async move {
            let _guard = guard;
            if let Err(e) = pool.replenish().await {
                tracing::warn!(error = %e, "Background proxy refresh failed");
            }
        });

        true
    }

    async fn refill_empty(&self) {
        let _serialized = self.shared.blocking_refill.lock().await;

        // Another worker may have refilled while we waited
        if !self.is_empty() {
            return;
        }

        tracing::info!("Proxy pool is empty, refilling before dispatch");
        if let Err(e) = self.replenish().await {
            tracing::warn!(error = %e, "Synchronous proxy refill failed");
        }
    }

    /// Number of proxies currently in the pool
    pub fn count(&self) -> usize {
        self.read_state().addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_state().addresses.is_empty()
    }

    /// The proxy the next `acquire` would return, without advancing
    pub fn peek(&self) -> Option<ProxyAddress> {
        let state = self.read_state();
        state.addresses.get(state.cursor).cloned()
    }

    /// Copy of the current addresses in selection order
    pub fn snapshot(&self) -> Vec<ProxyAddress> {
        self.read_state().addresses.clone()
    }

    pub fn contains(&self, address: &ProxyAddress) -> bool {
        self.read_state().addresses.contains(address)
    }

    pub fn watermark(&self) -> usize {
        self.shared.watermark
    }

    /// True while a background refresh is in flight
    pub fn is_refreshing(&self) -> bool {
        *self.shared.lock_refreshing()
    }

    /// Number of successful replenishments since creation
    pub fn replenishment_count(&self) -> u64 {
        self.shared.replenishments.load(Ordering::Relaxed)
    }

    /// Number of successful evictions since creation
    pub fn eviction_count(&self) -> u64 {
        self.shared.evictions.load(Ordering::Relaxed)
    }

    fn read_state(&self) -> RwLockReadGuard<'_, PoolState> {
        self.shared
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, PoolState> {
        self.shared
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
