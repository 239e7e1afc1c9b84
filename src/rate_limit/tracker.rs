//! Usage Tracker
//!
//! Shared, lock-guarded map of per-user usage records. Each operation that
//! reads and then writes a record does so under a single write lock, so two
//! concurrent requests can never both observe a stale "allowed" state.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::config::RateLimitConfig;
use super::usage::{Admission, UsageRecord, Windows};

/// Per-user admission control over a daily and a sliding minute window
#[derive(Debug, Clone)]
pub struct UsageTracker {
    /// Configuration
    config: Arc<RateLimitConfig>,

    /// Usage records keyed by user id
    records: Arc<RwLock<HashMap<String, UsageRecord>>>,
}

impl UsageTracker {
    /// Create a new usage tracker
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config: Arc::new(config),
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create with default configuration
    pub fn default_config() -> Self {
        Self::new(RateLimitConfig::default())
    }

    /// Create a tracker that admits everything (for testing)
    pub fn disabled() -> Self {
        Self::new(RateLimitConfig::disabled())
    }

    /// Get the configuration
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn windows(&self) -> Windows {
        Windows::from(self.config.as_ref())
    }

    fn evaluate(
        &self,
        user_id: &str,
        record: Option<&UsageRecord>,
        now: DateTime<Utc>,
    ) -> Admission {
        if !self.config.enabled {
            return Admission::Allowed;
        }

        let admission = match record {
            Some(record) => record.check(now, &self.windows()),
            None => UsageRecord::default().check(now, &self.windows()),
        };

        match admission {
            Admission::DailyLimitReached { count, limit } => {
                debug!("Daily limit reached for user {}: {}/{}", user_id, count, limit);
            }
            Admission::MinuteLimitReached { count, limit } => {
                debug!("Minute limit reached for user {}: {}/{}", user_id, count, limit);
            }
            Admission::Allowed => {}
        }

        admission
    }

    /// Check whether a user may make another request right now
    pub async fn can_proceed(&self, user_id: &str) -> bool {
        self.can_proceed_at(user_id, Utc::now()).await
    }

    /// Check whether a user may make another request at `now`
    pub async fn can_proceed_at(&self, user_id: &str, now: DateTime<Utc>) -> bool {
        self.admission_at(user_id, now).await.is_allowed()
    }

    /// Detailed admission decision at `now`, without mutation
    pub async fn admission_at(&self, user_id: &str, now: DateTime<Utc>) -> Admission {
        let records = self.records.read().await;
        self.evaluate(user_id, records.get(user_id), now)
    }

    /// Record a request for a user
    pub async fn record(&self, user_id: &str) {
        self.record_at(user_id, Utc::now()).await
    }

    /// Record a request for a user at `now`
    pub async fn record_at(&self, user_id: &str, now: DateTime<Utc>) {
        let windows = self.windows();
        let mut records = self.records.write().await;
        let record = records.entry(user_id.to_string()).or_default();
        record.record(now, &windows);

        debug!(
            "Request tracked for user {}. Daily: {}/{}",
            user_id, record.daily_count, self.config.max_requests_per_day
        );
    }

    /// Check and record in one step
    pub async fn try_record(&self, user_id: &str) -> Admission {
        self.try_record_at(user_id, Utc::now()).await
    }

    /// Check and record in one step at `now`. Nothing is recorded when the
    /// request is denied.
    pub async fn try_record_at(&self, user_id: &str, now: DateTime<Utc>) -> Admission {
        let windows = self.windows();
        let mut records = self.records.write().await;

        let admission = self.evaluate(user_id, records.get(user_id), now);
        if admission.is_allowed() {
            let record = records.entry(user_id.to_string()).or_default();
            record.record(now, &windows);
            debug!(
                "Request tracked for user {}. Daily: {}/{}",
                user_id, record.daily_count, self.config.max_requests_per_day
            );
        }

        admission
    }

    /// Get a user's record as of now
    pub async fn usage_for(&self, user_id: &str) -> Option<UsageRecord> {
        let now = Utc::now();
        let records = self.records.read().await;
        records
            .get(user_id)
            .map(|r| r.pruned(now, self.windows().minute))
    }

    /// Copy of all usage records with sliding logs pruned as of now
    pub async fn snapshot(&self) -> HashMap<String, UsageRecord> {
        self.snapshot_at(Utc::now()).await
    }

    /// Copy of all usage records with sliding logs pruned at `now`
    pub async fn snapshot_at(&self, now: DateTime<Utc>) -> HashMap<String, UsageRecord> {
        let minute = self.windows().minute;
        let records = self.records.read().await;
        records
            .iter()
            .map(|(user, record)| (user.clone(), record.pruned(now, minute)))
            .collect()
    }

    /// Forget all usage
    pub async fn reset_all(&self) {
        let mut records = self.records.write().await;
        records.clear();
    }

    /// Number of users tracked
    pub async fn user_count(&self) -> usize {
        let records = self.records.read().await;
        records.len()
    }
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::default_config()
    }
}
