//! Proxy supplier endpoint

use crate::proxy::{ProxyError, ProxyResult};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Source of fresh proxy lists
///
/// Implementations return the raw line-delimited body; parsing and
/// normalization happen in the pool so every supplier gets the same rules.
#[async_trait]
pub trait ProxySupplier: Send + Sync {
    /// Fetches the current proxy list body
    async fn fetch_list(&self) -> ProxyResult<String>;

    /// Human-readable origin for logs
    fn describe(&self) -> String;
}

/// Supplier backed by a single HTTP GET endpoint
pub struct HttpProxySupplier {
    client: Client,
    url: String,
}

impl HttpProxySupplier {
    /// Creates a supplier for `url` with the given request timeout
    pub fn new(url: impl Into<String>, timeout: Duration) -> ProxyResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ProxySupplier for HttpProxySupplier {
    async fn fetch_list(&self) -> ProxyResult<String> {
        tracing::debug!(url = %self.url, "Requesting proxy list");

        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(ProxyError::SupplierStatus {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Err(ProxyError::EmptyList);
        }

        Ok(body)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
