//! The resources a harvest run owns
//!
//! `HarvestContext` bundles the dedup store, record sink and proxy pool.
//! It is closed exactly once: explicitly through `close`, or when the
//! context is dropped on any other exit path.

use crate::config::Config;
use crate::output::{self, RecordSink};
use crate::proxy::{HttpProxySupplier, ProxyPool};
use crate::storage::{self, DedupStore};
use crate::{HarvestError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct HarvestContext {
    pub store: Arc<dyn DedupStore>,
    pub sink: Arc<dyn RecordSink>,
    pub pool: ProxyPool,
    closed: AtomicBool,
}

impl HarvestContext {
    pub fn new(store: Arc<dyn DedupStore>, sink: Arc<dyn RecordSink>, pool: ProxyPool) -> Self {
        Self {
            store,
            sink,
            pool,
            closed: AtomicBool::new(false),
        }
    }

    /// Opens the store and sink and loads the proxy pool
    ///
    /// Each step that fails releases what the earlier steps acquired before
    /// returning `HarvestError::Initialization`. An unreachable proxy
    /// supplier is not fatal; the pool starts empty.
    ///
    /// # Arguments
    ///
    /// * `config` - The validated configuration
    ///
    /// # Returns
    ///
    /// * `Ok(HarvestContext)` - All resources acquired
    /// * `Err(HarvestError::Initialization)` - A resource could not be built
    pub async fn initialize(config: &Config) -> Result<Self> {
        let store = storage::open_store(&config.storage)
            .map_err(|e| HarvestError::initialization("dedup store", e))?;

        let sink = match output::open_sink(&config.output) {
            Ok(sink) => sink,
            Err(e) => {
                release(&store, None);
                return Err(HarvestError::initialization("record sink", e));
            }
        };

        let supplier = match HttpProxySupplier::new(
            config.proxy.supplier_url.clone(),
            config.proxy.supplier_timeout(),
        ) {
            Ok(supplier) => supplier,
            Err(e) => {
                release(&store, Some(&sink));
                return Err(HarvestError::initialization("proxy supplier", e));
            }
        };

        let pool = ProxyPool::connect(Arc::new(supplier), config.proxy.watermark).await;
        if pool.is_empty() {
            tracing::warn!("Proxy pool is empty, requests will wait for the supplier");
        }

        Ok(Self::new(Arc::new(store), Arc::new(sink), pool))
    }

    /// Flushes and closes the sink, then closes the store
    ///
    /// Only the first call does anything. Both resources are closed even
    /// if the first one fails; the first error is returned.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        tracing::info!("Closing harvest context");
        let sink_result = self.sink.close();
        let store_result = self.store.close();

        sink_result?;
        store_result?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for HarvestContext {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!(error = %e, "Failed to close harvest context");
        }
    }
}

fn release(store: &dyn DedupStore, sink: Option<&dyn RecordSink>) {
    if let Some(sink) = sink {
        if let Err(e) = sink.close() {
            tracing::warn!(error = %e, "Failed to release record sink");
        }
    }
    if let Err(e) = store.close() {
        tracing::warn!(error = %e, "Failed to release dedup store");
    }
}
