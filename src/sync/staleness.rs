// SPDX-License-Identifier: GPL-3.0-only
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::Duration;

use crate::sync::models::CollectionKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStamp {
    /// Start time of the last successful pass, full or incremental
    pub last_synced: DateTime<Utc>,
    /// Start time of the last successful full resync
    pub last_full_sync: Option<DateTime<Utc>>,
}

/// Process-wide last-successful-sync timestamps per collection
///
/// Backed by a sharded concurrent map, so updating one collection never
/// blocks readers of another.
#[derive(Debug, Default)]
pub struct StalenessCache {
    stamps: DashMap<CollectionKey, SyncStamp>,
}

impl StalenessCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CollectionKey) -> Option<SyncStamp> {
        self.stamps.get(key).map(|entry| *entry.value())
    }

    pub fn last_synced(&self, key: &CollectionKey) -> Option<DateTime<Utc>> {
        self.get(key).map(|stamp| stamp.last_synced)
    }

    /// Whether `key` synced successfully less than `cache_timeout` ago
    pub fn is_fresh(&self, key: &CollectionKey, cache_timeout: Duration) -> bool {
        self.is_fresh_at(key, cache_timeout, Utc::now())
    }

    fn is_fresh_at(&self, key: &CollectionKey, cache_timeout: Duration, now: DateTime<Utc>) -> bool {
        let Some(last_synced) = self.last_synced(key) else {
            return false;
        };
        let Ok(window) = chrono::Duration::from_std(cache_timeout) else {
            return true;
        };
        now.signed_duration_since(last_synced) < window
    }

    /// Record a successful pass that started at `started_at`
    pub fn mark_synced(&self, key: &CollectionKey, started_at: DateTime<Utc>, full_resync: bool) {
        self.stamps
            .entry(key.clone())
            .and_modify(|stamp| {
                stamp.last_synced = started_at;
                if full_resync {
                    stamp.last_full_sync = Some(started_at);
                }
            })
            .or_insert(SyncStamp {
                last_synced: started_at,
                last_full_sync: full_resync.then_some(started_at),
            });
    }
}
