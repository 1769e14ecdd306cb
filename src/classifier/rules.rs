//! Per-attempt failure classification

use crate::proxy::ProxyAddress;
use std::fmt;

/// Error text fragments that identify a transport failure even when some
/// response bytes were received
const TRANSIENT_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "connection refused",
    "connection reset",
    "connection closed",
    "premature close",
    "eof",
];

/// Status codes meaning the target does not exist
const ABSENT_STATUSES: &[u16] = &[404, 410];

/// Status codes meaning the proxy was throttled or banned
const BLOCKED_STATUSES: &[u16] = &[403, 429, 503];

/// Result of a single fetch attempt, consumed once by `classify`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// The target URL, also the dedup key
    pub target: String,
    /// Proxy used for the attempt
    pub proxy: Option<ProxyAddress>,
    /// HTTP status, 0 when no response was received
    pub status: u16,
    /// Error text, if the attempt failed
    pub error: Option<String>,
}

impl FetchOutcome {
    /// Outcome of an attempt that received a response
    ///
    /// Non-2xx statuses carry an `HTTP <status>` error text.
    pub fn from_status(target: impl Into<String>, proxy: Option<ProxyAddress>, status: u16) -> Self {
        let error = if (200..300).contains(&status) {
            None
        } else {
            Some(format!("HTTP {}", status))
        };

        Self {
            target: target.into(),
            proxy,
            status,
            error,
        }
    }

    /// Outcome of an attempt that failed before a response arrived
    pub fn from_error(
        target: impl Into<String>,
        proxy: Option<ProxyAddress>,
        error: impl fmt::Display,
    ) -> Self {
        Self {
            target: target.into(),
            proxy,
            status: 0,
            error: Some(error.to_string()),
        }
    }

    pub fn has_response(&self) -> bool {
        self.status != 0
    }

    fn is_success_status(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn has_transient_error(&self) -> bool {
        self.error.as_deref().is_some_and(|text| {
            let lowered = text.to_ascii_lowercase();
            TRANSIENT_MARKERS.iter().any(|m| lowered.contains(m))
        })
    }
}

/// Error taxonomy for per-request failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Network-layer failure, no usable response
    TransportTransient,
    /// Server signaled throttling or a ban
    RateLimitedOrBlocked,
    /// Target does not exist
    ResourceAbsent,
    /// Anything else
    Unclassified,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TransportTransient => "transport-transient",
            Self::RateLimitedOrBlocked => "rate-limited-or-blocked",
            Self::ResourceAbsent => "resource-absent",
            Self::Unclassified => "unclassified",
        };
        f.write_str(name)
    }
}

/// What to do with a finished attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Process the response
    Success,
    /// Evict the proxy and try the same target again
    Retryable(FailureKind),
    /// Record the target as visited without processing it
    SkipAndMark,
    /// Drop the attempt; a later run may try again
    SkipNoMark,
}

impl Disposition {
    /// True if the proxy used for the attempt must leave the pool
    pub fn evicts_proxy(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// Failure class behind this disposition, `None` on success
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success => None,
            Self::Retryable(kind) => Some(*kind),
            Self::SkipAndMark => Some(FailureKind::ResourceAbsent),
            Self::SkipNoMark => Some(FailureKind::Unclassified),
        }
    }
}

/// Classifies a fetch outcome
///
/// Rules are evaluated in order, first match wins:
/// 1. No response → `Retryable(TransportTransient)`
/// 2. 404 / 410 → `SkipAndMark`
/// 3. 403 / 429 / 503 → `Retryable(RateLimitedOrBlocked)`
/// 4. 2xx whose body was cut off by a transport error → `Retryable(TransportTransient)`
/// 5. Any other error or non-2xx status → `SkipNoMark`
/// 6. Otherwise → `Success`
pub fn classify(outcome: &FetchOutcome) -> Disposition {
    if !outcome.has_response() {
        return Disposition::Retryable(FailureKind::TransportTransient);
    }

    if ABSENT_STATUSES.contains(&outcome.status) {
        return Disposition::SkipAndMark;
    }

    if BLOCKED_STATUSES.contains(&outcome.status) {
        return Disposition::Retryable(FailureKind::RateLimitedOrBlocked);
    }

    if outcome.is_success_status() && outcome.has_transient_error() {
        return Disposition::Retryable(FailureKind::TransportTransient);
    }

    if outcome.error.is_some() || !outcome.is_success_status() {
        return Disposition::SkipNoMark;
    }

    Disposition::Success
}
