//! Proxy pool management
//!
//! This module supplies one proxy per outbound request attempt:
//! - `ProxyAddress`: a normalized `scheme://host:port` endpoint
//! - `ProxySupplier`: the external endpoint that hands out fresh proxy lists
//! - `ProxyPool`: round-robin selection, eviction of bad proxies, and
//!   watermark-triggered, single-flight replenishment

mod address;
mod pool;
mod supplier;

pub use address::{parse_proxy_list, ProxyAddress, DEFAULT_SCHEME};
pub use pool::ProxyPool;
pub use supplier::{HttpProxySupplier, ProxySupplier};

use thiserror::Error;

/// Errors that can occur while acquiring or replenishing proxies
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("No proxy available")]
    NoProxyAvailable,

    #[error("Invalid proxy address: {0}")]
    InvalidAddress(String),

    #[error("Proxy supplier returned HTTP {status}")]
    SupplierStatus { status: u16 },

    #[error("Proxy supplier returned no usable entries")]
    EmptyList,

    #[error("Proxy supplier request failed: {0}")]
    Supplier(#[from] reqwest::Error),
}

/// Result type for proxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;
