//! Failure classification and retry control
//!
//! Every fetch attempt ends in exactly one disposition:
//! - `Success`: hand the response to extraction
//! - `Retryable`: evict the proxy, try the same target again
//! - `SkipAndMark`: the target is gone, remember it without processing
//! - `SkipNoMark`: log and drop, a future run may try again
//!
//! Initialization failures never pass through here; they surface as
//! `HarvestError::Initialization` while the harvest context is built.

mod controller;
mod retry;
mod rules;

pub use controller::{Resolution, RetryController};
pub use retry::RetryPolicy;
pub use rules::{classify, Disposition, FailureKind, FetchOutcome};
