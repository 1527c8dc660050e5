// SPDX-License-Identifier: GPL-3.0-only
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sync::models::{SourceItem, StoredItemSummary};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPost {
    /// Store-internal identifier
    pub id: String,

    /// Collection the post belongs to
    pub blog_key: String,

    /// Identifier assigned by the source
    pub source_id: String,

    /// Content fingerprint reported by the source
    pub hash: String,

    pub title: String,

    pub body: String,

    pub author: Option<String>,

    pub tags: Vec<String>,

    pub published_at: Option<DateTime<Utc>>,

    /// Source-side modification time
    pub source_updated_at: Option<DateTime<Utc>>,

    /// When this row was last written by a sync pass
    pub synced_at: DateTime<Utc>,
}

impl StoredPost {
    pub fn from_source(id: String, blog_key: String, item: &SourceItem, synced_at: DateTime<Utc>) -> Self {
        Self {
            id,
            blog_key,
            source_id: item.source_id.clone(),
            hash: item.hash.clone(),
            title: item.title.clone(),
            body: item.body.clone(),
            author: item.author.clone(),
            tags: item.tags.clone(),
            published_at: item.published_at,
            source_updated_at: item.updated_at,
            synced_at,
        }
    }

    pub fn summary(&self) -> StoredItemSummary {
        StoredItemSummary::new(self.id.clone(), self.source_id.clone(), self.hash.clone())
    }
}
