// SPDX-License-Identifier: GPL-3.0-only
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::sync::error::{InvalidCollectionKey, SyncError};

/// Maximum length of a collection key
const MAX_KEY_LENGTH: usize = 128;

/// Identifier of one independently synchronized collection (one blog)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CollectionKey(String);

impl CollectionKey {
    /// Parse and validate a raw key
    ///
    /// Keys are used in URL paths and as storage partitions, so they must be
    /// non-empty, free of surrounding whitespace and must not contain `/`.
    pub fn parse(raw: &str) -> Result<Self, InvalidCollectionKey> {
        if raw.is_empty() {
            return Err(InvalidCollectionKey::Empty);
        }
        if raw.len() > MAX_KEY_LENGTH {
            return Err(InvalidCollectionKey::TooLong {
                len: raw.len(),
                max: MAX_KEY_LENGTH,
            });
        }
        if raw.trim() != raw {
            return Err(InvalidCollectionKey::Whitespace(raw.to_string()));
        }
        if raw.contains('/') || raw.chars().any(char::is_control) {
            return Err(InvalidCollectionKey::IllegalCharacter(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CollectionKey {
    type Err = InvalidCollectionKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for CollectionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A unit of content as produced by the source for one collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceItem {
    /// Identifier assigned by the source, unique within a collection
    pub source_id: String,

    /// Content fingerprint (source "updated" timestamp, etag, ...)
    pub hash: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub body: String,

    #[serde(default)]
    pub author: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SourceItem {
    pub fn new(source_id: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            hash: hash.into(),
            title: String::new(),
            body: String::new(),
            author: None,
            tags: Vec::new(),
            published_at: None,
            updated_at: None,
        }
    }
}

/// Cheap projection of a stored post, used only for diffing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredItemSummary {
    /// Store-internal identity
    pub stored_id: String,
    pub source_id: String,
    pub hash: String,
}

impl StoredItemSummary {
    pub fn new(
        stored_id: impl Into<String>,
        source_id: impl Into<String>,
        hash: impl Into<String>,
    ) -> Self {
        Self {
            stored_id: stored_id.into(),
            source_id: source_id.into(),
            hash: hash.into(),
        }
    }
}

/// A source item matched to the stored row it replaces
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedItem {
    pub stored_id: String,
    pub item: SourceItem,
}

/// Minimal set of writes that brings one collection in line with the source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub inserted: Vec<SourceItem>,
    pub updated: Vec<MatchedItem>,
    pub deleted: Vec<StoredItemSummary>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inserted.len() + self.updated.len() + self.deleted.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshKind {
    /// The staleness window had not elapsed; the source was not contacted
    SkippedFresh,
    /// Another refresh of the same collection was in flight
    SkippedAlreadyRunning,
    /// The pipeline finished while the caller waited
    CompletedSync,
    /// The pipeline keeps running in the background
    StartedAsync,
    Failed,
}

impl fmt::Display for RefreshKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RefreshKind::SkippedFresh => "skipped_fresh",
            RefreshKind::SkippedAlreadyRunning => "skipped_already_running",
            RefreshKind::CompletedSync => "completed_sync",
            RefreshKind::StartedAsync => "started_async",
            RefreshKind::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of one orchestration pass for one collection
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub key: CollectionKey,
    pub kind: RefreshKind,
    /// Whether the collection has any stored post; sampled before the pass,
    /// re-checked once a waited pass completes or fails
    pub had_existing_data: bool,
    pub elapsed: Duration,
    pub error: Option<Arc<SyncError>>,
}

impl RefreshOutcome {
    pub fn new(key: CollectionKey, kind: RefreshKind, had_existing_data: bool, elapsed: Duration) -> Self {
        Self {
            key,
            kind,
            had_existing_data,
            elapsed,
            error: None,
        }
    }

    pub fn failed(key: CollectionKey, error: SyncError, had_existing_data: bool, elapsed: Duration) -> Self {
        Self {
            key,
            kind: RefreshKind::Failed,
            had_existing_data,
            elapsed,
            error: Some(Arc::new(error)),
        }
    }

    /// A failure is critical when it leaves the collection without data, or
    /// when the caller forced a refresh that did not happen.
    pub fn is_critical(&self, force: bool) -> bool {
        self.kind == RefreshKind::Failed && (!self.had_existing_data || force)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_key_parse_valid() {
        let key = CollectionKey::parse("engineering-blog").unwrap();
        assert_eq!(key.as_str(), "engineering-blog");
        assert_eq!(key.to_string(), "engineering-blog");
    }

    #[test]
    fn test_collection_key_is_case_sensitive() {
        let lower: CollectionKey = "news".parse().unwrap();
        let upper: CollectionKey = "News".parse().unwrap();
        assert_ne!(lower, upper);
    }

    #[test]
    fn test_collection_key_rejects_empty() {
        assert_eq!(CollectionKey::parse(""), Err(InvalidCollectionKey::Empty));
    }

    #[test]
    fn test_collection_key_rejects_whitespace_and_slash() {
        assert!(matches!(
            CollectionKey::parse(" news"),
            Err(InvalidCollectionKey::Whitespace(_))
        ));
        assert!(matches!(
            CollectionKey::parse("news/../admin"),
            Err(InvalidCollectionKey::IllegalCharacter(_))
        ));
    }

    #[test]
    fn test_collection_key_rejects_too_long() {
        let raw = "a".repeat(MAX_KEY_LENGTH + 1);
        assert!(matches!(
            CollectionKey::parse(&raw),
            Err(InvalidCollectionKey::TooLong { .. })
        ));
    }

    #[test]
    fn test_source_item_deserialize_with_defaults() {
        let json = r#"{"source_id": "post-1", "hash": "2024-01-01T00:00:00Z"}"#;
        let item: SourceItem = serde_json::from_str(json).unwrap();
        assert_eq!(item, SourceItem::new("post-1", "2024-01-01T00:00:00Z"));
    }

    #[test]
    fn test_source_item_deserialize_full() {
        let json = r#"{
            "source_id": "post-2",
            "hash": "etag-2",
            "title": "Hello",
            "body": "<p>Hi</p>",
            "author": "sam",
            "tags": ["rust", "sync"],
            "published_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-02T00:00:00Z"
        }"#;
        let item: SourceItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.title, "Hello");
        assert_eq!(item.author.as_deref(), Some("sam"));
        assert_eq!(item.tags, vec!["rust".to_string(), "sync".to_string()]);
        assert!(item.published_at.unwrap() < item.updated_at.unwrap());
    }

    #[test]
    fn test_refresh_kind_serializes_snake_case() {
        let json = serde_json::to_string(&RefreshKind::SkippedAlreadyRunning).unwrap();
        assert_eq!(json, "\"skipped_already_running\"");
        assert_eq!(RefreshKind::StartedAsync.to_string(), "started_async");
    }

    #[test]
    fn test_outcome_criticality() {
        let key = CollectionKey::parse("news").unwrap();
        let err = || SyncError::SourceFetch {
            key: key.clone(),
            source: anyhow::anyhow!("boom"),
        };

        let empty = RefreshOutcome::failed(key.clone(), err(), false, Duration::ZERO);
        assert!(empty.is_critical(false));

        let populated = RefreshOutcome::failed(key.clone(), err(), true, Duration::ZERO);
        assert!(!populated.is_critical(false));
        assert!(populated.is_critical(true));

        let skipped = RefreshOutcome::new(key, RefreshKind::SkippedFresh, false, Duration::ZERO);
        assert!(!skipped.is_critical(true));
    }

    #[test]
    fn test_change_set_len() {
        let mut changes = ChangeSet::default();
        assert!(changes.is_empty());
        changes.inserted.push(SourceItem::new("a", "h"));
        changes.deleted.push(StoredItemSummary::new("1", "b", "h"));
        assert_eq!(changes.len(), 2);
        assert!(!changes.is_empty());
    }
}
