//! Dashboard core configuration
//!
//! All knobs are externally supplied by the host app; defaults match the
//! documented behavior (300ms debounce, 5 minute cache freshness, 3
//! retry attempts).

use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_DEBOUNCE_MS: u64 = 300;
pub const DEFAULT_CACHE_TTL_MS: u64 = 5 * 60 * 1000;
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    /// Quiet period before filter edits settle
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// How long a successful fetch result stays fresh
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    /// Attempt cap for manual refetch (total attempts, not extra retries)
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    /// Transport-level timeout for the HTTP backend
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_cache_ttl_ms() -> u64 {
    DEFAULT_CACHE_TTL_MS
}

fn default_max_retry_attempts() -> u32 {
    DEFAULT_MAX_RETRY_ATTEMPTS
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl DashboardConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
