//! Admin Control
//!
//! Read and reset access to the usage tracker and result cache for
//! operators. Every call requires an authenticated caller holding the admin
//! capability.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::auth::Caller;
use crate::cache::ResultCache;
use crate::grading::GradeError;
use crate::rate_limit::UsageTracker;

/// Daily counter of one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyUsage {
    /// Requests recorded in the stored daily window
    pub count: u32,

    /// Start of the stored daily window
    pub date: Option<DateTime<Utc>>,
}

/// Configured limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub daily: u32,
    pub minute: u32,
}

/// Snapshot of admission and cache state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    /// Per-user daily counters
    pub daily_usage: BTreeMap<String, DailyUsage>,

    /// Per-user requests inside the sliding window
    pub recent_requests: BTreeMap<String, Vec<DateTime<Utc>>>,

    /// Number of cached results
    pub cache_size: usize,

    /// Configured limits
    pub limits: Limits,
}

/// Result of a reset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetResponse {
    pub success: bool,
}

/// Operator access to grading state
#[derive(Debug, Clone)]
pub struct AdminControl {
    tracker: UsageTracker,
    cache: ResultCache,
}

impl AdminControl {
    /// Create over the same tracker and cache the orchestrator uses
    pub fn new(tracker: UsageTracker, cache: ResultCache) -> Self {
        Self { tracker, cache }
    }

    fn authorize<'a>(caller: Option<&'a Caller>) -> Result<&'a Caller, GradeError> {
        let caller = caller.ok_or(GradeError::Unauthenticated)?;
        if !caller.is_admin {
            return Err(GradeError::PermissionDenied);
        }
        Ok(caller)
    }

    /// Current usage and cache state
    pub async fn stats(&self, caller: Option<&Caller>) -> Result<AdminStats, GradeError> {
        Self::authorize(caller)?;
        Ok(self.build_stats(Utc::now()).await)
    }

    async fn build_stats(&self, now: DateTime<Utc>) -> AdminStats {
        let snapshot = self.tracker.snapshot_at(now).await;
        let config = self.tracker.config();

        let mut daily_usage = BTreeMap::new();
        let mut recent_requests = BTreeMap::new();
        for (user_id, record) in snapshot {
            daily_usage.insert(
                user_id.clone(),
                DailyUsage {
                    count: record.daily_count,
                    date: record.daily_window_start,
                },
            );
            recent_requests.insert(user_id, record.recent_requests);
        }

        AdminStats {
            daily_usage,
            recent_requests,
            cache_size: self.cache.size().await,
            limits: Limits {
                daily: config.max_requests_per_day,
                minute: config.max_requests_per_minute,
            },
        }
    }

    /// Clear all usage counters and cached results
    pub async fn reset_all(&self, caller: Option<&Caller>) -> Result<ResetResponse, GradeError> {
        let caller = Self::authorize(caller)?;

        self.tracker.reset_all().await;
        self.cache.clear().await;

        info!("Usage counters and result cache reset by {}", caller.user_id);
        Ok(ResetResponse { success: true })
    }
}
