//! Retry budget and backoff

use crate::config::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// How often and how patiently a retryable target is attempted again
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per target including the first, `None` for unbounded
    pub max_attempts: Option<u32>,
    pub base_ms: u64,
    pub factor: f64,
    pub max_ms: u64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryConfig::default().into()
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(c: &RetryConfig) -> Self {
        Self {
            max_attempts: c.max_attempts,
            base_ms: c.backoff_base_ms,
            factor: c.backoff_factor,
            max_ms: c.backoff_max_ms,
            jitter: c.jitter,
        }
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(c: RetryConfig) -> Self {
        Self::from(&c)
    }
}

impl RetryPolicy {
    /// Returns true if a target whose `attempt`-th try just failed may be
    /// tried again (attempts are counted from 1)
    pub fn allows_retry(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }

    /// Delay before the retry that follows the `attempt`-th try
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_delay_ms(attempt.saturating_sub(1)))
    }

    /// Exponential backoff capped at `max_ms`, with optional ±50% jitter.
    /// `retry_idx` is 0 for the first retry.
    pub fn backoff_delay_ms(&self, retry_idx: u32) -> u64 {
        if self.base_ms == 0 {
            return 0;
        }

        let exponent = retry_idx.min(i32::MAX as u32) as i32;
        let raw = self.base_ms as f64 * self.factor.powi(exponent);
        let base = raw.min(self.max_ms as f64).round() as u64;

        if !self.jitter {
            return base;
        }

        let low = (base as f64 * 0.5) as u64;
        let high = (base as f64 * 1.5) as u64;
        if low >= high {
            base
        } else {
            rand::thread_rng().gen_range(low..=high)
        }
    }
}
