//! Warehouse backend configuration
//!
//! Settings for the columnar warehouse reached over its HTTP/JSON API:
//! base URL, a pre-resolved bearer token (credential resolution happens
//! upstream), and the async job-polling knobs.

use serde::Deserialize;
use std::time::Duration;

/// Default warehouse API base URL
pub const DEFAULT_API_URL: &str = "https://warehouse.example.com/api/v2";

/// Default fixed backoff between job-result polls
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 3;

/// Default hard ceiling for one async job, measured from submission
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 300;

/// Default per-request HTTP timeout
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default retry attempts for transient API failures
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Warehouse backend settings
///
/// # Example
///
/// ```toml
/// [warehouse]
/// api_url = "https://warehouse.example.com/api/v2"
/// token = "bearer-token"
/// resource_uri_prefix = "https://warehouse.example.com"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    /// API base URL
    pub api_url: String,

    /// Pre-resolved bearer token; None sends unauthenticated requests
    pub token: Option<String>,

    /// URI prefix that selects this backend's resources
    pub resource_uri_prefix: String,

    /// Fixed backoff between job-result polls, in seconds
    pub poll_interval_secs: u64,

    /// Hard ceiling for one async job, in seconds from submission
    pub poll_timeout_secs: u64,

    /// Per-request HTTP timeout, in seconds
    pub request_timeout_secs: u64,

    /// Retry attempts for transient API failures
    pub max_retries: u32,

    /// Base delay for exponential retry backoff, in milliseconds
    pub retry_base_delay_ms: u64,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            resource_uri_prefix: "https://warehouse.example.com".to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: 1000,
        }
    }
}

impl WarehouseConfig {
    /// Poll backoff as a Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Job timeout as a Duration
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    /// HTTP request timeout as a Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
