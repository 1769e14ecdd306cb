//! Proxy address normalization and supplier list parsing

use crate::proxy::{ProxyError, ProxyResult};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Scheme assumed for supplier entries given as bare `host:port`
pub const DEFAULT_SCHEME: &str = "http";

/// A proxy endpoint in `scheme://host:port` form
///
/// Immutable once constructed; equality is plain string equality on the
/// normalized form, which is what eviction matches on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyAddress(String);

impl ProxyAddress {
    /// Normalizes a raw supplier entry
    ///
    /// Surrounding whitespace is trimmed and `http://` is prefixed when the
    /// entry carries no scheme. The result must parse as a URL with a host.
    ///
    /// # Example
    ///
    /// ```
    /// use phone_harvest::proxy::ProxyAddress;
    ///
    /// let proxy = ProxyAddress::parse(" 1.2.3.4:8080 ").unwrap();
    /// assert_eq!(proxy.as_str(), "http://1.2.3.4:8080");
    /// ```
    pub fn parse(raw: &str) -> ProxyResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ProxyError::InvalidAddress(raw.to_string()));
        }

        let formatted = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("{}://{}", DEFAULT_SCHEME, trimmed)
        };

        let url = Url::parse(&formatted)
            .map_err(|e| ProxyError::InvalidAddress(format!("{}: {}", trimmed, e)))?;
        if url.host_str().map_or(true, str::is_empty) {
            return Err(ProxyError::InvalidAddress(trimmed.to_string()));
        }

        Ok(Self(formatted))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The scheme part (`http`, `https`, `socks5`, ...)
    pub fn scheme(&self) -> &str {
        self.0.split("://").next().unwrap_or(DEFAULT_SCHEME)
    }
}

impl fmt::Display for ProxyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProxyAddress {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for ProxyAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Parses a supplier response body into proxy addresses
///
/// One entry per line; `\n` and `\r\n` terminators are both accepted, blank
/// lines are skipped and malformed entries are dropped with a warning.
/// Supplier order is preserved.
pub fn parse_proxy_list(body: &str) -> Vec<ProxyAddress> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match ProxyAddress::parse(line) {
            Ok(address) => Some(address),
            Err(e) => {
                tracing::warn!(entry = line, error = %e, "Skipping malformed proxy entry");
                None
            }
        })
        .collect()
}
