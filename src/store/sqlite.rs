// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::Path;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::store::{models::StoredPost, traits::PostStore};
use crate::sync::models::{ChangeSet, CollectionKey, StoredItemSummary};

pub struct SqlitePostStore {
    pool: SqlitePool,
}

impl SqlitePostStore {
    pub async fn new(db_path: &Path) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;

        let store = Self { pool };
        store.init_schema().await?;

        Ok(store)
    }

    async fn init_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id TEXT PRIMARY KEY,
                blog_key TEXT NOT NULL,
                source_id TEXT NOT NULL CHECK (length(source_id) > 0),
                hash TEXT NOT NULL,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                author TEXT,
                tags_json TEXT NOT NULL DEFAULT '[]',
                published_at TEXT,
                source_updated_at TEXT,
                synced_at TEXT NOT NULL,
                UNIQUE (blog_key, source_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_blog_key ON posts (blog_key)")
            .execute(&self.pool)
            .await?;

        info!("Initialized SQLite post store schema");
        Ok(())
    }

    fn post_from_row(&self, row: &SqliteRow) -> anyhow::Result<StoredPost> {
        let tags_json: String = row.get("tags_json");
        let tags = serde_json::from_str(&tags_json).unwrap_or_else(|e| {
            warn!(error = %e, "Invalid tags_json in post store, ignoring tags");
            Vec::new()
        });

        Ok(StoredPost {
            id: row.get::<String, _>("id"),
            blog_key: row.get::<String, _>("blog_key"),
            source_id: row.get::<String, _>("source_id"),
            hash: row.get::<String, _>("hash"),
            title: row.get::<String, _>("title"),
            body: row.get::<String, _>("body"),
            author: row.get::<Option<String>, _>("author"),
            tags,
            published_at: parse_optional_timestamp(row.get("published_at"))?,
            source_updated_at: parse_optional_timestamp(row.get("source_updated_at"))?,
            synced_at: parse_timestamp(&row.get::<String, _>("synced_at"))?,
        })
    }
}

fn parse_timestamp(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

fn parse_optional_timestamp(raw: Option<String>) -> anyhow::Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_timestamp).transpose()
}

#[async_trait]
impl PostStore for SqlitePostStore {
    async fn list_summaries(&self, key: &CollectionKey) -> anyhow::Result<Vec<StoredItemSummary>> {
        let rows = sqlx::query("SELECT id, source_id, hash FROM posts WHERE blog_key = ?1")
            .bind(key.as_str())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| StoredItemSummary {
                stored_id: row.get("id"),
                source_id: row.get("source_id"),
                hash: row.get("hash"),
            })
            .collect())
    }

    async fn has_any_data(&self, key: &CollectionKey) -> anyhow::Result<bool> {
        let exists: i64 = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM posts WHERE blog_key = ?1)")
            .bind(key.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(exists != 0)
    }

    async fn apply_change_set(&self, key: &CollectionKey, changes: &ChangeSet) -> anyhow::Result<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let synced_at = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for item in &changes.inserted {
            sqlx::query(
                r#"
                INSERT INTO posts (id, blog_key, source_id, hash, title, body, author, tags_json, published_at, source_updated_at, synced_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ON CONFLICT (blog_key, source_id) DO UPDATE SET
                    hash = excluded.hash,
                    title = excluded.title,
                    body = excluded.body,
                    author = excluded.author,
                    tags_json = excluded.tags_json,
                    published_at = excluded.published_at,
                    source_updated_at = excluded.source_updated_at,
                    synced_at = excluded.synced_at
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(key.as_str())
            .bind(&item.source_id)
            .bind(&item.hash)
            .bind(&item.title)
            .bind(&item.body)
            .bind(&item.author)
            .bind(serde_json::to_string(&item.tags)?)
            .bind(item.published_at.map(|t| t.to_rfc3339()))
            .bind(item.updated_at.map(|t| t.to_rfc3339()))
            .bind(&synced_at)
            .execute(&mut *tx)
            .await?;
        }

        for matched in &changes.updated {
            let item = &matched.item;
            let result = sqlx::query(
                r#"
                UPDATE posts
                SET hash = ?3, title = ?4, body = ?5, author = ?6, tags_json = ?7, published_at = ?8, source_updated_at = ?9, synced_at = ?10
                WHERE id = ?1 AND blog_key = ?2
                "#,
            )
            .bind(&matched.stored_id)
            .bind(key.as_str())
            .bind(&item.hash)
            .bind(&item.title)
            .bind(&item.body)
            .bind(&item.author)
            .bind(serde_json::to_string(&item.tags)?)
            .bind(item.published_at.map(|t| t.to_rfc3339()))
            .bind(item.updated_at.map(|t| t.to_rfc3339()))
            .bind(&synced_at)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                warn!(blog = %key, stored_id = %matched.stored_id, "Updated post no longer exists in store");
            }
        }

        for summary in &changes.deleted {
            sqlx::query("DELETE FROM posts WHERE id = ?1 AND blog_key = ?2")
                .bind(&summary.stored_id)
                .bind(key.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        info!(
            blog = %key,
            inserted = changes.inserted.len(),
            updated = changes.updated.len(),
            deleted = changes.deleted.len(),
            "Applied change set to post store"
        );
        Ok(())
    }

    async fn list_posts(&self, key: &CollectionKey) -> anyhow::Result<Vec<StoredPost>> {
        let rows = sqlx::query(
            "SELECT * FROM posts WHERE blog_key = ?1 ORDER BY published_at DESC, source_id ASC",
        )
        .bind(key.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut posts = Vec::new();
        for row in rows {
            match self.post_from_row(&row) {
                Ok(post) => posts.push(post),
                Err(e) => {
                    error!(error = %e, blog = %key, "Failed to parse post from database");
                }
            }
        }

        Ok(posts)
    }

    async fn get_post(&self, key: &CollectionKey, source_id: &str) -> anyhow::Result<Option<StoredPost>> {
        let row = sqlx::query("SELECT * FROM posts WHERE blog_key = ?1 AND source_id = ?2")
            .bind(key.as_str())
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.post_from_row(&row)?)),
            None => Ok(None),
        }
    }
}
