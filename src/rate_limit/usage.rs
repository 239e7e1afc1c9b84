//! Usage Records
//!
//! Per-user counters over a lazily rolled daily window and a sliding
//! request log. All expiry is evaluated at the moment of access.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::config::RateLimitConfig;
use crate::config::seconds_to_delta;

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request may proceed
    Allowed,
    /// The daily window is exhausted
    DailyLimitReached { count: u32, limit: u32 },
    /// The sliding minute window is exhausted
    MinuteLimitReached { count: u32, limit: u32 },
}

impl Admission {
    /// Whether the request may proceed
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

/// Resolved window lengths and limits used by record arithmetic
#[derive(Debug, Clone, Copy)]
pub struct Windows {
    pub daily: Duration,
    pub minute: Duration,
    pub daily_limit: u32,
    pub minute_limit: u32,
}

impl From<&RateLimitConfig> for Windows {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            daily: seconds_to_delta(config.daily_window_secs),
            minute: seconds_to_delta(config.minute_window_secs),
            daily_limit: config.max_requests_per_day,
            minute_limit: config.max_requests_per_minute,
        }
    }
}

/// Whether a request made at `at` is still inside the sliding window. A
/// window reaching back before representable time keeps everything.
fn is_live(at: DateTime<Utc>, now: DateTime<Utc>, minute: Duration) -> bool {
    match now.checked_sub_signed(minute) {
        Some(cutoff) => at > cutoff,
        None => true,
    }
}

/// Usage counters for a single user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Requests recorded in the current daily window
    pub daily_count: u32,

    /// Start of the current daily window
    pub daily_window_start: Option<DateTime<Utc>>,

    /// Timestamps of recent requests, oldest first. May contain entries
    /// older than the sliding window until the next prune.
    pub recent_requests: Vec<DateTime<Utc>>,
}

impl UsageRecord {
    /// Whether the daily window has elapsed (or never started) at `now`
    fn daily_window_elapsed(&self, now: DateTime<Utc>, daily: Duration) -> bool {
        match self.daily_window_start {
            None => true,
            Some(start) => now.signed_duration_since(start) >= daily,
        }
    }

    /// Daily count as it would read after a rollover at `now`
    pub fn effective_daily_count(&self, now: DateTime<Utc>, daily: Duration) -> u32 {
        if self.daily_window_elapsed(now, daily) {
            0
        } else {
            self.daily_count
        }
    }

    /// Number of recorded requests strictly newer than `now - minute`
    pub fn active_requests(&self, now: DateTime<Utc>, minute: Duration) -> u32 {
        self.recent_requests
            .iter()
            .filter(|t| is_live(**t, now, minute))
            .count() as u32
    }

    /// Check both windows without mutating the record
    pub fn check(&self, now: DateTime<Utc>, windows: &Windows) -> Admission {
        let daily = self.effective_daily_count(now, windows.daily);
        if daily >= windows.daily_limit {
            return Admission::DailyLimitReached {
                count: daily,
                limit: windows.daily_limit,
            };
        }

        let recent = self.active_requests(now, windows.minute);
        if recent >= windows.minute_limit {
            return Admission::MinuteLimitReached {
                count: recent,
                limit: windows.minute_limit,
            };
        }

        Admission::Allowed
    }

    /// Reset the daily window if it has elapsed at `now`
    pub fn roll_over(&mut self, now: DateTime<Utc>, daily: Duration) {
        if self.daily_window_elapsed(now, daily) {
            self.daily_count = 0;
            self.daily_window_start = Some(now);
        }
    }

    /// Drop request timestamps that fell out of the sliding window
    pub fn prune(&mut self, now: DateTime<Utc>, minute: Duration) {
        self.recent_requests.retain(|t| is_live(*t, now, minute));
    }

    /// Record one request at `now`
    pub fn record(&mut self, now: DateTime<Utc>, windows: &Windows) {
        self.roll_over(now, windows.daily);
        self.prune(now, windows.minute);
        self.daily_count = self.daily_count.saturating_add(1);
        self.recent_requests.push(now);
    }

    /// Copy of this record with the sliding log pruned at `now`
    pub fn pruned(&self, now: DateTime<Utc>, minute: Duration) -> Self {
        let mut copy = self.clone();
        copy.prune(now, minute);
        copy
    }
}
