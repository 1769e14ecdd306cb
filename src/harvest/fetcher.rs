//! HTTP fetcher implementation
//!
//! This module issues page requests through the assigned proxy:
//! - One reqwest client per proxy, cached and reused
//! - Round-robin `User-Agent` rotation with fixed `Accept` headers
//! - Error text that carries the transport failure class, so the
//!   classifier can tell timeouts and refused connections apart

use crate::config::HarvesterConfig;
use crate::proxy::ProxyAddress;
use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{Client, Proxy};
use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
const ACCEPT_LANGUAGE_EN: &str = "en-US,en;q=0.9";

/// Cached proxy clients before the cache is flushed; proxies churn quickly
const MAX_CACHED_CLIENTS: usize = 256;

/// A received response
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    /// URL after redirects
    pub final_url: String,
    pub body: String,
}

/// Errors from a single fetch attempt
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timeout: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("invalid proxy {proxy}: {message}")]
    Proxy { proxy: String, message: String },

    #[error("request failed: {0}")]
    Request(String),

    /// The response head arrived but the body could not be read
    #[error("{message}")]
    Body { status: u16, message: String },
}

impl FetchError {
    /// HTTP status received before the failure, 0 if none
    pub fn status(&self) -> u16 {
        match self {
            Self::Body { status, .. } => *status,
            _ => 0,
        }
    }

    fn from_reqwest(err: &reqwest::Error) -> Self {
        let message = error_chain(err);
        if err.is_timeout() {
            Self::Timeout(message)
        } else if err.is_connect() {
            Self::Connect(message)
        } else {
            Self::Request(message)
        }
    }
}

/// Renders an error with all of its sources
fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Transport seam used by the orchestrator
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `url` through `proxy`
    ///
    /// Non-2xx responses are returned as `Ok`; only transport failures are
    /// errors.
    async fn fetch(&self, url: &str, proxy: &ProxyAddress) -> Result<FetchResponse, FetchError>;
}

/// reqwest-backed fetcher
pub struct ReqwestFetcher {
    clients: Mutex<HashMap<ProxyAddress, Client>>,
    user_agents: Vec<HeaderValue>,
    next_agent: AtomicUsize,
    timeout: Duration,
}

impl ReqwestFetcher {
    /// Creates a fetcher from the `[harvester]` section
    ///
    /// # Returns
    ///
    /// * `Ok(ReqwestFetcher)` - Fetcher ready for use
    /// * `Err(FetchError)` - A configured User-Agent is not a valid header value
    pub fn new(config: &HarvesterConfig) -> Result<Self, FetchError> {
        let mut user_agents = config
            .user_agents
            .iter()
            .map(|ua| {
                HeaderValue::from_str(ua)
                    .map_err(|e| FetchError::Request(format!("invalid user agent '{}': {}", ua, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if user_agents.is_empty() {
            user_agents.push(HeaderValue::from_static(crate::config::DEFAULT_USER_AGENT));
        }

        Ok(Self {
            clients: Mutex::new(HashMap::new()),
            user_agents,
            next_agent: AtomicUsize::new(0),
            timeout: config.request_timeout(),
        })
    }

    /// Number of proxy clients currently cached
    pub fn cached_clients(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn next_user_agent(&self) -> HeaderValue {
        let index = self.next_agent.fetch_add(1, Ordering::Relaxed) % self.user_agents.len();
        self.user_agents[index].clone()
    }

    fn client_for(&self, proxy: &ProxyAddress) -> Result<Client, FetchError> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(proxy) {
            return Ok(client.clone());
        }

        if clients.len() >= MAX_CACHED_CLIENTS {
            tracing::debug!(cached = clients.len(), "Flushing proxy client cache");
            clients.clear();
        }

        let invalid = |e: reqwest::Error| FetchError::Proxy {
            proxy: proxy.to_string(),
            message: error_chain(&e),
        };

        let client = Client::builder()
            .proxy(Proxy::all(proxy.as_str()).map_err(invalid)?)
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(invalid)?;

        clients.insert(proxy.clone(), client.clone());
        Ok(client)
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str, proxy: &ProxyAddress) -> Result<FetchResponse, FetchError> {
        let client = self.client_for(proxy)?;

        tracing::debug!(url, proxy = %proxy, "Requesting page");

        let response = client
            .get(url)
            .header(USER_AGENT, self.next_user_agent())
            .header(ACCEPT, ACCEPT_HTML)
            .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_EN)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        let body = response.text().await.map_err(|e| {
            let prefix = if e.is_timeout() {
                "timeout reading body"
            } else {
                "error reading body"
            };
            FetchError::Body {
                status,
                message: format!("{}: {}", prefix, error_chain(&e)),
            }
        })?;

        tracing::debug!(url, status, bytes = body.len(), "Received response");

        Ok(FetchResponse {
            status,
            final_url,
            body,
        })
    }
}
