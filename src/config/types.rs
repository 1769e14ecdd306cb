use serde::Deserialize;
use std::time::Duration;

/// Browser identity sent when no `user-agents` list is configured
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Main configuration structure for Phone-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub harvester: HarvesterConfig,
    pub proxy: ProxyConfig,
    pub storage: StorageConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Harvest behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HarvesterConfig {
    /// Brand index pages the harvest starts from
    #[serde(rename = "seed-urls")]
    pub seed_urls: Vec<String>,

    /// Hosts that discovered links may point to (empty = any host)
    #[serde(rename = "allowed-domains", default)]
    pub allowed_domains: Vec<String>,

    /// Number of concurrent fetch workers
    pub parallelism: u32,

    /// Fixed delay before every request (milliseconds)
    #[serde(rename = "delay-ms", default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Upper bound of the extra random delay before every request (milliseconds)
    #[serde(rename = "random-delay-ms", default = "default_random_delay_ms")]
    pub random_delay_ms: u64,

    /// Whole-request timeout for page fetches (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// User-Agent strings rotated across requests
    #[serde(rename = "user-agents", default = "default_user_agents")]
    pub user_agents: Vec<String>,
}

impl HarvesterConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Proxy supplier configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Endpoint returning one proxy per line
    #[serde(rename = "supplier-url")]
    pub supplier_url: String,

    /// Pool size below which a background refill is started
    pub watermark: usize,

    /// Timeout for a single supplier call (seconds)
    #[serde(rename = "supplier-timeout-secs", default = "default_supplier_timeout")]
    pub supplier_timeout_secs: u64,
}

impl ProxyConfig {
    pub fn supplier_timeout(&self) -> Duration {
        Duration::from_secs(self.supplier_timeout_secs)
    }
}

/// Dedup store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Name of the table holding visited keys
    #[serde(default = "default_collection")]
    pub collection: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the JSON-lines record file
    #[serde(rename = "records-path")]
    pub records_path: String,
}

/// Retry behavior for retryable fetch failures
///
/// The defaults retry forever without delay.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts per target, including the first (absent = unbounded)
    #[serde(rename = "max-attempts", default)]
    pub max_attempts: Option<u32>,

    #[serde(rename = "backoff-base-ms", default)]
    pub backoff_base_ms: u64,

    #[serde(rename = "backoff-factor", default = "default_backoff_factor")]
    pub backoff_factor: f64,

    #[serde(rename = "backoff-max-ms", default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            backoff_base_ms: 0,
            backoff_factor: default_backoff_factor(),
            backoff_max_ms: default_backoff_max_ms(),
            jitter: false,
        }
    }
}

fn default_delay_ms() -> u64 {
    1000
}

fn default_random_delay_ms() -> u64 {
    500
}

fn default_request_timeout() -> u64 {
    15
}

fn default_user_agents() -> Vec<String> {
    vec![DEFAULT_USER_AGENT.to_string()]
}

fn default_supplier_timeout() -> u64 {
    10
}

fn default_collection() -> String {
    "visited_urls".to_string()
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_backoff_max_ms() -> u64 {
    30_000
}
