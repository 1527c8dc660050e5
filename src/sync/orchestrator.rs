// SPDX-License-Identifier: GPL-3.0-only
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::source::ContentSource;
use crate::store::PostStore;
use crate::sync::changeset::compute_change_set;
use crate::sync::error::SyncError;
use crate::sync::key_lock::SingleFlightKeyLock;
use crate::sync::models::{CollectionKey, RefreshKind, RefreshOutcome};
use crate::sync::staleness::StalenessCache;

#[derive(Debug, Clone)]
pub struct RefreshSettings {
    /// Let refreshes of already populated collections run in the background
    pub async_refresh: bool,

    /// Staleness window; a collection synced more recently is skipped
    pub cache_timeout: Duration,

    /// Bound on how long a caller blocks on a synchronous refresh
    pub sync_timeout: Duration,

    /// Force a full resync once the last one is older than this
    pub full_resync_interval: Option<Duration>,

    /// Poll period of `wait_until_any_data`
    pub data_poll_interval: Duration,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            async_refresh: false,
            cache_timeout: Duration::from_secs(60),
            sync_timeout: Duration::from_secs(30),
            full_resync_interval: Some(Duration::from_secs(24 * 60 * 60)),
            data_poll_interval: Duration::from_millis(250),
        }
    }
}

/// Per-collection refresh decisions
///
/// Each call walks: in-flight check, staleness check, pipeline launch on its
/// own task, then either waits (bounded by `sync_timeout`) or returns
/// immediately. Fetch and persist failures are reported through the
/// returned `RefreshOutcome`, never as errors.
#[derive(Clone)]
pub struct RefreshOrchestrator {
    pipeline: RefreshPipeline,
    key_lock: Arc<SingleFlightKeyLock>,
    settings: RefreshSettings,
}

/// fetch -> diff -> persist for one collection
#[derive(Clone)]
struct RefreshPipeline {
    source: Arc<dyn ContentSource>,
    store: Arc<dyn PostStore>,
    staleness: Arc<StalenessCache>,
    full_resync_interval: Option<Duration>,
}

impl RefreshOrchestrator {
    pub fn new(
        source: Arc<dyn ContentSource>,
        store: Arc<dyn PostStore>,
        key_lock: Arc<SingleFlightKeyLock>,
        staleness: Arc<StalenessCache>,
        settings: RefreshSettings,
    ) -> Self {
        Self {
            pipeline: RefreshPipeline {
                source,
                store,
                staleness,
                full_resync_interval: settings.full_resync_interval,
            },
            key_lock,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn PostStore> {
        &self.pipeline.store
    }

    /// Refresh one collection
    ///
    /// `force` bypasses the staleness and in-flight skips: a forced call
    /// queues behind an in-flight refresh of the same key, then runs its own
    /// pass and always waits for it. Queueing and waiting share one
    /// `sync_timeout` budget; a forced call still queued when it runs out
    /// reports `SkippedAlreadyRunning` without starting a pass.
    pub async fn refresh_one(&self, key: &CollectionKey, force: bool) -> RefreshOutcome {
        let started = Instant::now();
        let deadline = started + self.settings.sync_timeout;

        let guard = if force {
            match tokio::time::timeout_at(deadline, self.key_lock.acquire(key.as_str())).await {
                Ok(guard) => guard,
                Err(_) => {
                    warn!(
                        blog = %key,
                        timeout_ms = self.settings.sync_timeout.as_millis() as u64,
                        "Forced refresh still queued behind an in-flight pass at sync timeout"
                    );
                    let had_data = self.has_any_data(key).await;
                    return RefreshOutcome::new(
                        key.clone(),
                        RefreshKind::SkippedAlreadyRunning,
                        had_data,
                        started.elapsed(),
                    );
                }
            }
        } else {
            match self.key_lock.try_acquire(key.as_str()) {
                Some(guard) => guard,
                None => {
                    debug!(blog = %key, "Refresh already running, skipping");
                    let had_data = self.has_any_data(key).await;
                    return RefreshOutcome::new(
                        key.clone(),
                        RefreshKind::SkippedAlreadyRunning,
                        had_data,
                        started.elapsed(),
                    );
                }
            }
        };

        if !force && self.pipeline.staleness.is_fresh(key, self.settings.cache_timeout) {
            drop(guard);
            debug!(blog = %key, "Collection is fresh, skipping refresh");
            let had_data = self.has_any_data(key).await;
            return RefreshOutcome::new(key.clone(), RefreshKind::SkippedFresh, had_data, started.elapsed());
        }

        let had_data = self.has_any_data(key).await;

        let pipeline = self.pipeline.clone();
        let task_key = key.clone();
        let mut task = tokio::spawn(async move {
            let _guard = guard;
            let result = pipeline.run(&task_key).await;
            if let Err(ref e) = result {
                warn!(blog = %task_key, error = %e, "Refresh pipeline failed");
            }
            result
        });

        let wait = force || !self.settings.async_refresh || !had_data;
        if !wait {
            info!(blog = %key, "Refresh continues in background");
            return RefreshOutcome::new(key.clone(), RefreshKind::StartedAsync, had_data, started.elapsed());
        }

        match tokio::time::timeout_at(deadline, &mut task).await {
            Ok(Ok(Ok(()))) => {
                let had_data = self.has_any_data(key).await;
                RefreshOutcome::new(key.clone(), RefreshKind::CompletedSync, had_data, started.elapsed())
            }
            Ok(Ok(Err(e))) => self.failed(key, e, started).await,
            Ok(Err(join_error)) => {
                let e = SyncError::TaskFailed {
                    key: key.clone(),
                    reason: join_error.to_string(),
                };
                warn!(blog = %key, error = %e, "Refresh task did not complete");
                self.failed(key, e, started).await
            }
            Err(_) => {
                warn!(
                    blog = %key,
                    timeout_ms = self.settings.sync_timeout.as_millis() as u64,
                    "Refresh still running after sync timeout, continuing in background"
                );
                RefreshOutcome::new(key.clone(), RefreshKind::StartedAsync, had_data, started.elapsed())
            }
        }
    }

    /// Block until the collection has at least one stored post, or `timeout` elapses
    pub async fn wait_until_any_data(&self, key: &CollectionKey, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.has_any_data(key).await {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                debug!(blog = %key, "Gave up waiting for collection data");
                return false;
            }
            tokio::time::sleep(self.settings.data_poll_interval.min(deadline - now)).await;
        }
    }

    async fn failed(&self, key: &CollectionKey, error: SyncError, started: Instant) -> RefreshOutcome {
        // Re-checked: a partial write before the failure may have changed it
        let had_data = self.has_any_data(key).await;
        RefreshOutcome::failed(key.clone(), error, had_data, started.elapsed())
    }

    async fn has_any_data(&self, key: &CollectionKey) -> bool {
        match self.pipeline.store.has_any_data(key).await {
            Ok(has_data) => has_data,
            Err(e) => {
                warn!(blog = %key, error = %e, "Failed to check stored data, assuming none");
                false
            }
        }
    }
}

impl RefreshPipeline {
    /// `None` requests a full resync
    fn since_for(&self, key: &CollectionKey, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let stamp = self.staleness.get(key)?;
        let last_full_sync = stamp.last_full_sync?;

        if let Some(interval) = self.full_resync_interval {
            let due = chrono::Duration::from_std(interval)
                .map(|interval| now.signed_duration_since(last_full_sync) >= interval)
                .unwrap_or(false);
            if due {
                return None;
            }
        }

        Some(stamp.last_synced)
    }

    async fn run(&self, key: &CollectionKey) -> Result<(), SyncError> {
        let started_at = Utc::now();
        let timer = Instant::now();
        let since = self.since_for(key, started_at);

        let items = self
            .source
            .fetch_items(key, since)
            .await
            .map_err(|source| SyncError::SourceFetch {
                key: key.clone(),
                source,
            })?;

        let stored = self
            .store
            .list_summaries(key)
            .await
            .map_err(|source| SyncError::Persist {
                key: key.clone(),
                source,
            })?;

        let fetched = items.len();
        let changes = compute_change_set(items, &stored, since);

        self.store
            .apply_change_set(key, &changes)
            .await
            .map_err(|source| SyncError::Persist {
                key: key.clone(),
                source,
            })?;

        self.staleness.mark_synced(key, started_at, since.is_none());

        info!(
            blog = %key,
            full_resync = since.is_none(),
            fetched,
            inserted = changes.inserted.len(),
            updated = changes.updated.len(),
            deleted = changes.deleted.len(),
            elapsed_ms = timer.elapsed().as_millis() as u64,
            "Refresh pipeline completed"
        );
        Ok(())
    }
}
