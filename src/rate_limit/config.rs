//! Rate Limit Configuration
//!
//! Configuration for per-user admission control.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default rate limits
pub const DEFAULT_DAILY_LIMIT: u32 = 200; // requests per daily window
pub const DEFAULT_MINUTE_LIMIT: u32 = 10; // requests per sliding minute
pub const DEFAULT_DAILY_WINDOW_SECS: u64 = 24 * 3600;
pub const DEFAULT_MINUTE_WINDOW_SECS: u64 = 60;

/// Rate limit configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,

    /// Maximum recorded requests per user per daily window
    pub max_requests_per_day: u32,

    /// Maximum recorded requests per user per sliding minute window
    pub max_requests_per_minute: u32,

    /// Length of the daily window in seconds
    pub daily_window_secs: u64,

    /// Length of the sliding window in seconds
    pub minute_window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests_per_day: DEFAULT_DAILY_LIMIT,
            max_requests_per_minute: DEFAULT_MINUTE_LIMIT,
            daily_window_secs: DEFAULT_DAILY_WINDOW_SECS,
            minute_window_secs: DEFAULT_MINUTE_WINDOW_SECS,
        }
    }
}

impl RateLimitConfig {
    /// Create a new rate limit configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration with custom limits and default windows
    pub fn with_limits(max_requests_per_day: u32, max_requests_per_minute: u32) -> Self {
        Self {
            max_requests_per_day,
            max_requests_per_minute,
            ..Self::default()
        }
    }

    /// Get the daily window duration
    pub fn daily_window(&self) -> Duration {
        Duration::from_secs(self.daily_window_secs)
    }

    /// Get the sliding window duration
    pub fn minute_window(&self) -> Duration {
        Duration::from_secs(self.minute_window_secs)
    }

    /// Disable rate limiting (for testing)
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}
