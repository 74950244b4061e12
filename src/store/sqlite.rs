//! SQLite-backed [`CrawlStore`] implementation.
//!
//! Maps each operation onto the `sources`, `crawl_queue` and `documents`
//! tables created by [`migrate`](crate::migrate). Timestamps are stored as
//! Unix seconds.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::{DocType, Document, FrontierItem, FrontierStatus, NewFrontierItem, Source};

use super::{CrawlStore, SourceStats};

/// SQLite implementation of the [`CrawlStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and ensure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn to_json(list: &[String]) -> String {
    serde_json::to_string(list).unwrap_or_else(|_| "[]".to_string())
}

fn from_json(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn source_from_row(row: &SqliteRow) -> Source {
    let enabled: i64 = row.get("enabled");
    Source {
        key: row.get("key"),
        name: row.get("name"),
        seed_urls: from_json(row.get("seed_urls_json")),
        allowed_hosts: from_json(row.get("allowed_hosts_json")),
        allowed_prefixes: from_json(row.get("allowed_prefixes_json")),
        enabled: enabled != 0,
    }
}

fn frontier_from_row(row: &SqliteRow) -> Result<FrontierItem> {
    let status: String = row.get("status");
    Ok(FrontierItem {
        url: row.get("url"),
        source_key: row.get("source_key"),
        depth: row.get("depth"),
        priority: row.get("priority"),
        fail_count: row.get("fail_count"),
        status: FrontierStatus::parse(&status)
            .with_context(|| format!("unknown frontier status: {}", status))?,
    })
}

fn document_from_row(row: &SqliteRow) -> Result<Document> {
    let doc_type: String = row.get("doc_type");
    let fetched_at: i64 = row.get("fetched_at");
    Ok(Document {
        source_key: row.get("source_key"),
        canonical_url: row.get("canonical_url"),
        doc_type: DocType::parse(&doc_type)
            .with_context(|| format!("unknown document type: {}", doc_type))?,
        title: row.get("title"),
        content_text: row.get("content_text"),
        checksum: row.get("checksum"),
        storage_path: row.get("storage_path"),
        mime_type: row.get("mime_type"),
        fetched_at: DateTime::from_timestamp(fetched_at, 0).unwrap_or_default(),
    })
}

#[async_trait]
impl CrawlStore for SqliteStore {
    async fn upsert_source(&self, source: &Source) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sources (key, name, seed_urls_json, allowed_hosts_json,
                                 allowed_prefixes_json, enabled, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                name = excluded.name,
                seed_urls_json = excluded.seed_urls_json,
                allowed_hosts_json = excluded.allowed_hosts_json,
                allowed_prefixes_json = excluded.allowed_prefixes_json,
                enabled = excluded.enabled,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&source.key)
        .bind(&source.name)
        .bind(to_json(&source.seed_urls))
        .bind(to_json(&source.allowed_hosts))
        .bind(to_json(&source.allowed_prefixes))
        .bind(source.enabled as i64)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_sources(&self) -> Result<Vec<Source>> {
        let rows = sqlx::query(
            "SELECT key, name, seed_urls_json, allowed_hosts_json, allowed_prefixes_json, enabled FROM sources ORDER BY key ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(source_from_row).collect())
    }

    async fn enabled_sources(&self) -> Result<Vec<Source>> {
        let rows = sqlx::query(
            "SELECT key, name, seed_urls_json, allowed_hosts_json, allowed_prefixes_json, enabled FROM sources WHERE enabled = 1 ORDER BY key ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(source_from_row).collect())
    }

    async fn enqueue(&self, item: &NewFrontierItem) -> Result<bool> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO crawl_queue (url, source_key, depth, priority, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO NOTHING
            "#,
        )
        .bind(&item.url)
        .bind(&item.source_key)
        .bind(item.depth)
        .bind(item.priority)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn dequeue(&self, limit: usize, max_fail_count: i64) -> Result<Vec<FrontierItem>> {
        let rows = sqlx::query(
            r#"
            SELECT url, source_key, depth, priority, fail_count, status
            FROM crawl_queue
            WHERE status = 'pending'
               OR (status = 'error' AND fail_count < ? AND next_attempt_at <= ?)
            ORDER BY priority DESC, depth ASC, created_at ASC, rowid ASC
            LIMIT ?
            "#,
        )
        .bind(max_fail_count)
        .bind(Utc::now().timestamp())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(frontier_from_row).collect()
    }

    async fn mark_success(&self, url: &str, http_status: u16) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE crawl_queue
            SET status = 'success', http_status = ?, last_error = NULL, updated_at = ?
            WHERE url = ?
            "#,
        )
        .bind(http_status as i64)
        .bind(Utc::now().timestamp())
        .bind(url)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_error(
        &self,
        url: &str,
        error: &str,
        fail_count: i64,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE crawl_queue
            SET status = 'error', last_error = ?, fail_count = ?, next_attempt_at = ?, updated_at = ?
            WHERE url = ?
            "#,
        )
        .bind(error)
        .bind(fail_count)
        .bind(next_attempt_at.timestamp())
        .bind(Utc::now().timestamp())
        .bind(url)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn requeue_if_stale(&self, url: &str, older_than: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE crawl_queue
            SET status = 'pending', updated_at = ?
            WHERE url = ? AND status = 'success' AND updated_at < ?
            "#,
        )
        .bind(Utc::now().timestamp())
        .bind(url)
        .bind(older_than.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn frontier_item(&self, url: &str) -> Result<Option<FrontierItem>> {
        let row = sqlx::query(
            "SELECT url, source_key, depth, priority, fail_count, status FROM crawl_queue WHERE url = ?",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(frontier_from_row).transpose()
    }

    async fn prune_succeeded(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM crawl_queue WHERE status = 'success' AND updated_at < ?")
                .bind(older_than.timestamp())
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }

    async fn upsert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (canonical_url, source_key, doc_type, title, content_text,
                                   checksum, storage_path, mime_type, fetched_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(canonical_url) DO UPDATE SET
                source_key = excluded.source_key,
                doc_type = excluded.doc_type,
                title = excluded.title,
                content_text = excluded.content_text,
                checksum = excluded.checksum,
                storage_path = excluded.storage_path,
                mime_type = excluded.mime_type,
                fetched_at = excluded.fetched_at
            "#,
        )
        .bind(&doc.canonical_url)
        .bind(&doc.source_key)
        .bind(doc.doc_type.as_str())
        .bind(&doc.title)
        .bind(&doc.content_text)
        .bind(&doc.checksum)
        .bind(&doc.storage_path)
        .bind(&doc.mime_type)
        .bind(doc.fetched_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_document(&self, canonical_url: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            r#"
            SELECT canonical_url, source_key, doc_type, title, content_text,
                   checksum, storage_path, mime_type, fetched_at
            FROM documents WHERE canonical_url = ?
            "#,
        )
        .bind(canonical_url)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(document_from_row).transpose()
    }

    async fn source_stats(&self, max_fail_count: i64) -> Result<Vec<SourceStats>> {
        let queue_rows = sqlx::query(
            r#"
            SELECT
                source_key,
                SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END) AS pending,
                SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END) AS succeeded,
                SUM(CASE WHEN status = 'error' THEN 1 ELSE 0 END) AS failed,
                SUM(CASE WHEN status = 'error' AND fail_count >= ? THEN 1 ELSE 0 END) AS exhausted
            FROM crawl_queue
            GROUP BY source_key
            "#,
        )
        .bind(max_fail_count)
        .fetch_all(&self.pool)
        .await?;

        let doc_rows = sqlx::query(
            r#"
            SELECT source_key, COUNT(*) AS documents, MAX(fetched_at) AS last_fetched_at
            FROM documents
            GROUP BY source_key
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats: std::collections::BTreeMap<String, SourceStats> =
            std::collections::BTreeMap::new();
        for row in &queue_rows {
            let key: String = row.get("source_key");
            let entry = stats.entry(key.clone()).or_insert_with(|| SourceStats {
                source_key: key,
                ..Default::default()
            });
            entry.pending = row.get("pending");
            entry.succeeded = row.get("succeeded");
            entry.failed = row.get("failed");
            entry.exhausted = row.get("exhausted");
        }
        for row in &doc_rows {
            let key: String = row.get("source_key");
            let entry = stats.entry(key.clone()).or_insert_with(|| SourceStats {
                source_key: key,
                ..Default::default()
            });
            entry.documents = row.get("documents");
            entry.last_fetched_at = row.get("last_fetched_at");
        }

        Ok(stats.into_values().collect())
    }
}
