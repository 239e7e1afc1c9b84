//! Result Cache
//!
//! TTL-bounded, capacity-bounded store of grading results. Eviction is by
//! insertion order: overwriting a key refreshes its timestamp but keeps its
//! original position.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::config::CacheConfig;
use crate::config::seconds_to_delta;
use crate::grading::types::GradeResult;

#[derive(Debug, Clone)]
struct CacheEntry {
    result: GradeResult,
    stored_at: DateTime<Utc>,
    seq: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Insertion sequence -> key, oldest first
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl CacheState {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

/// Shared cache of grading results
#[derive(Debug, Clone)]
pub struct ResultCache {
    ttl: Duration,
    max_entries: usize,
    state: Arc<RwLock<CacheState>>,
}

impl ResultCache {
    /// Create a new result cache
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            ttl: seconds_to_delta(config.ttl_secs),
            max_entries: config.max_entries,
            state: Arc::new(RwLock::new(CacheState::default())),
        }
    }

    /// Maximum number of entries
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Look up a result
    pub async fn get(&self, key: &str) -> Option<GradeResult> {
        self.get_at(key, Utc::now()).await
    }

    /// Look up a result at `now`. An expired entry is removed and reported
    /// as absent.
    pub async fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<GradeResult> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let entry = state.entries.get(key)?;

        // An expiry past the end of representable time never arrives
        let live = match entry.stored_at.checked_add_signed(self.ttl) {
            Some(expires_at) => now < expires_at,
            None => true,
        };
        if live {
            return Some(entry.result);
        }

        state.remove(key);
        debug!("Cache entry expired: {}", key);
        None
    }

    /// Store a result
    pub async fn put(&self, key: &str, result: GradeResult) {
        self.put_at(key, result, Utc::now()).await
    }

    /// Store a result at `now`, evicting the oldest-inserted entries while
    /// over capacity
    pub async fn put_at(&self, key: &str, result: GradeResult, now: DateTime<Utc>) {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        if let Some(entry) = state.entries.get_mut(key) {
            entry.result = result;
            entry.stored_at = now;
        } else {
            let seq = state.next_seq;
            state.next_seq += 1;
            state.order.insert(seq, key.to_string());
            state.entries.insert(
                key.to_string(),
                CacheEntry {
                    result,
                    stored_at: now,
                    seq,
                },
            );
        }

        while state.entries.len() > self.max_entries {
            match state.evict_oldest() {
                Some(evicted) => debug!("Cache full, evicted {}", evicted),
                None => break,
            }
        }

        debug!("Result cached successfully");
    }

    /// Number of stored entries, including expired ones not yet touched
    pub async fn size(&self) -> usize {
        self.state.read().await.entries.len()
    }

    /// Remove everything
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.entries.clear();
        state.order.clear();
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}
