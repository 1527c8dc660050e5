// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use crate::store::models::StoredPost;
use crate::sync::models::{ChangeSet, CollectionKey, StoredItemSummary};

#[async_trait]
pub trait PostStore: Send + Sync {
    /// List the diffing projection (stored id, source id, hash) of a collection
    async fn list_summaries(&self, key: &CollectionKey) -> anyhow::Result<Vec<StoredItemSummary>>;

    /// Whether the collection has at least one stored post
    async fn has_any_data(&self, key: &CollectionKey) -> anyhow::Result<bool>;

    /// Apply inserts, updates and deletes atomically
    async fn apply_change_set(&self, key: &CollectionKey, changes: &ChangeSet) -> anyhow::Result<()>;

    /// List all stored posts of a collection
    async fn list_posts(&self, key: &CollectionKey) -> anyhow::Result<Vec<StoredPost>>;

    /// Get a stored post by its source id
    async fn get_post(&self, key: &CollectionKey, source_id: &str) -> anyhow::Result<Option<StoredPost>>;
}
