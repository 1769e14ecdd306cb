//! Phone-Harvest: a proxy-rotating, restart-safe phone specification harvester
//!
//! This crate walks a phone catalogue (brand index → brand listings → detail
//! pages) through a rotating pool of short-lived proxies, records every
//! processed page in a durable dedup store, and emits one JSON line per phone.

pub mod classifier;
pub mod config;
pub mod harvest;
pub mod output;
pub mod proxy;
pub mod storage;

use thiserror::Error;

/// Main error type for Phone-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    /// Unrecoverable failure while building the harvest context
    #[error("Failed to initialize {component}: {message}")]
    Initialization { component: String, message: String },
}

impl HarvestError {
    /// Wraps any displayable error as an initialization failure of `component`
    pub fn initialization(component: &str, err: impl std::fmt::Display) -> Self {
        Self::Initialization {
            component: component.to_string(),
            message: err.to_string(),
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Phone-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use classifier::{classify, Disposition, FailureKind, FetchOutcome, RetryController};
pub use config::Config;
pub use harvest::{HarvestContext, Orchestrator};
pub use proxy::{ProxyAddress, ProxyPool};
pub use storage::{DedupStore, SqliteDedupStore};
