// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::sync::models::{CollectionKey, SourceItem};

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch the posts of one collection
    ///
    /// With `since` set, only posts changed after that instant are returned;
    /// without it, every post of the collection is returned.
    async fn fetch_items(
        &self,
        key: &CollectionKey,
        since: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<SourceItem>>;
}
