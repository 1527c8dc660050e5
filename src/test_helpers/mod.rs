// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::Config;
use crate::source::ContentSource;
use crate::store::{PostStore, SqlitePostStore, StoredPost};
use crate::sync::models::{ChangeSet, CollectionKey, SourceItem, StoredItemSummary};
use crate::sync::{RefreshOrchestrator, RefreshSettings, SingleFlightKeyLock, StalenessCache};

pub fn key(name: &str) -> CollectionKey {
    CollectionKey::parse(name).expect("valid test key")
}

pub fn items(ids: &[(&str, &str)]) -> Vec<SourceItem> {
    ids.iter().map(|(id, hash)| SourceItem::new(*id, *hash)).collect()
}

/// Create a SQLite store in a temporary directory
pub async fn setup_test_store() -> anyhow::Result<(SqlitePostStore, tempfile::TempDir)> {
    let temp_dir = create_temp_dir();
    let store = SqlitePostStore::new(&temp_dir.path().join("test_posts.db")).await?;
    Ok((store, temp_dir))
}

/// Create a test configuration with temporary paths
pub fn create_test_config() -> Config {
    use std::net::SocketAddr;
    use std::str::FromStr;

    let temp_dir = std::env::temp_dir().join(format!("blogsync-test-{}", uuid::Uuid::new_v4()));

    Config {
        store_db_path: temp_dir.join("test_posts.db"),
        source_api_url: "http://localhost:3000/api".to_string(),
        source_api_key: None,
        blogs: vec!["news".to_string(), "engineering".to_string()],
        local_api_bind: SocketAddr::from_str("127.0.0.1:0").unwrap(), // Use port 0 to auto-assign
        refresh_interval_secs: 60,
        log_level: "error".to_string(), // Reduce log noise in tests
        async_refresh: false,
        cache_timeout_secs: 60,
        sync_timeout_secs: 30,
        wait_for_data_timeout_secs: 1,
        full_resync_interval_secs: Some(86400),
        max_parallel_refreshes: None,
    }
}

/// Create a temporary directory for tests
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::TempDir::new().expect("Failed to create temp directory")
}

/// Source fake with per-collection content, latency and failure switches
#[derive(Default)]
pub struct ScriptedSource {
    content: Mutex<HashMap<CollectionKey, Vec<SourceItem>>>,
    calls: Mutex<Vec<(CollectionKey, Option<DateTime<Utc>>)>>,
    delay: Mutex<Duration>,
    failing: Mutex<Vec<CollectionKey>>,
    panic: AtomicBool,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(self, key: &CollectionKey, items: Vec<SourceItem>) -> Self {
        self.set_items(key, items);
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = delay;
        self
    }

    pub fn set_items(&self, key: &CollectionKey, items: Vec<SourceItem>) {
        self.content.lock().unwrap().insert(key.clone(), items);
    }

    pub fn fail_for(&self, key: &CollectionKey) {
        self.failing.lock().unwrap().push(key.clone());
    }

    pub fn panic_on_fetch(&self) {
        self.panic.store(true, Ordering::SeqCst);
    }

    pub fn fetch_count(&self, key: &CollectionKey) -> usize {
        self.calls.lock().unwrap().iter().filter(|(k, _)| k == key).count()
    }

    pub fn since_values(&self, key: &CollectionKey) -> Vec<Option<DateTime<Utc>>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, since)| *since)
            .collect()
    }
}

#[async_trait]
impl ContentSource for ScriptedSource {
    async fn fetch_items(
        &self,
        key: &CollectionKey,
        since: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<SourceItem>> {
        self.calls.lock().unwrap().push((key.clone(), since));

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.panic.load(Ordering::SeqCst) {
            panic!("scripted source panic");
        }
        if self.failing.lock().unwrap().contains(key) {
            return Err(anyhow::anyhow!("source unavailable for {}", key));
        }

        Ok(self.content.lock().unwrap().get(key).cloned().unwrap_or_default())
    }
}

/// Post store fake keeping everything in memory
#[derive(Default)]
pub struct MemoryPostStore {
    posts: Mutex<HashMap<CollectionKey, Vec<StoredPost>>>,
    fail_apply: AtomicBool,
    next_id: Mutex<u64>,
}

impl MemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, key: &CollectionKey, items: &[SourceItem]) {
        let changes = ChangeSet {
            inserted: items.to_vec(),
            ..ChangeSet::default()
        };
        self.apply(key, &changes);
    }

    pub fn fail_apply(&self) {
        self.fail_apply.store(true, Ordering::SeqCst);
    }

    pub fn source_ids(&self, key: &CollectionKey) -> Vec<String> {
        let mut ids: Vec<String> = self
            .posts
            .lock()
            .unwrap()
            .get(key)
            .map(|posts| posts.iter().map(|p| p.source_id.clone()).collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    fn apply(&self, key: &CollectionKey, changes: &ChangeSet) {
        let now = Utc::now();
        let mut posts = self.posts.lock().unwrap();
        let collection = posts.entry(key.clone()).or_default();

        for item in &changes.inserted {
            let mut next_id = self.next_id.lock().unwrap();
            *next_id += 1;
            collection.push(StoredPost::from_source(
                format!("mem-{}", *next_id),
                key.to_string(),
                item,
                now,
            ));
        }
        for matched in &changes.updated {
            if let Some(post) = collection.iter_mut().find(|p| p.id == matched.stored_id) {
                *post = StoredPost::from_source(post.id.clone(), key.to_string(), &matched.item, now);
            }
        }
        collection.retain(|post| !changes.deleted.iter().any(|d| d.stored_id == post.id));
    }
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn list_summaries(&self, key: &CollectionKey) -> anyhow::Result<Vec<StoredItemSummary>> {
        Ok(self
            .posts
            .lock()
            .unwrap()
            .get(key)
            .map(|posts| posts.iter().map(StoredPost::summary).collect())
            .unwrap_or_default())
    }

    async fn has_any_data(&self, key: &CollectionKey) -> anyhow::Result<bool> {
        Ok(self.posts.lock().unwrap().get(key).is_some_and(|posts| !posts.is_empty()))
    }

    async fn apply_change_set(&self, key: &CollectionKey, changes: &ChangeSet) -> anyhow::Result<()> {
        if self.fail_apply.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("store is read-only"));
        }
        self.apply(key, changes);
        Ok(())
    }

    async fn list_posts(&self, key: &CollectionKey) -> anyhow::Result<Vec<StoredPost>> {
        Ok(self.posts.lock().unwrap().get(key).cloned().unwrap_or_default())
    }

    async fn get_post(&self, key: &CollectionKey, source_id: &str) -> anyhow::Result<Option<StoredPost>> {
        Ok(self
            .posts
            .lock()
            .unwrap()
            .get(key)
            .and_then(|posts| posts.iter().find(|p| p.source_id == source_id).cloned()))
    }
}

/// Orchestrator wired to in-memory fakes
pub fn orchestrator_with(
    source: Arc<ScriptedSource>,
    store: Arc<MemoryPostStore>,
    settings: RefreshSettings,
) -> RefreshOrchestrator {
    RefreshOrchestrator::new(
        source,
        store,
        Arc::new(SingleFlightKeyLock::new()),
        Arc::new(StalenessCache::new()),
        settings,
    )
}
