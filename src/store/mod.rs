//! Persistence abstraction for the crawler.
//!
//! The [`CrawlStore`] trait covers the source registry, the URL frontier and
//! the document table. Every write is an idempotent upsert keyed by a stable
//! identity (source key, URL), so overlapping runs only ever duplicate work.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! | Implementation | Purpose |
//! |----------------|---------|
//! | [`sqlite::SqliteStore`] | Production store (sqlx, SQLite WAL) |
//! | [`memory::MemoryStore`] | Tests and embedding |

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Document, FrontierItem, NewFrontierItem, Source};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Per-source crawl health.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    pub source_key: String,
    pub pending: i64,
    pub succeeded: i64,
    pub failed: i64,
    /// Error rows that reached the retry ceiling.
    pub exhausted: i64,
    pub documents: i64,
    pub last_fetched_at: Option<i64>,
}

/// Abstract storage backend for the crawler.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_source`](CrawlStore::upsert_source) | Register or update a source |
/// | [`enabled_sources`](CrawlStore::enabled_sources) | Sources to crawl this run |
/// | [`enqueue`](CrawlStore::enqueue) | Idempotent frontier insert |
/// | [`dequeue`](CrawlStore::dequeue) | Next eligible frontier items |
/// | [`mark_success`](CrawlStore::mark_success) / [`mark_error`](CrawlStore::mark_error) | Record an attempt |
/// | [`upsert_document`](CrawlStore::upsert_document) | Write the canonical document for a URL |
#[async_trait]
pub trait CrawlStore: Send + Sync {
    /// Insert or replace a source definition.
    async fn upsert_source(&self, source: &Source) -> Result<()>;

    /// All registered sources, ordered by key.
    async fn list_sources(&self) -> Result<Vec<Source>>;

    /// Registered sources with `enabled = true`, ordered by key.
    async fn enabled_sources(&self) -> Result<Vec<Source>> {
        Ok(self
            .list_sources()
            .await?
            .into_iter()
            .filter(|s| s.enabled)
            .collect())
    }

    /// Insert a frontier row unless the URL is already present.
    ///
    /// Returns `true` when a new row was created. Existing rows keep their
    /// first-seen depth, priority and status.
    async fn enqueue(&self, item: &NewFrontierItem) -> Result<bool>;

    /// Up to `limit` eligible items: `pending`, or `error` with
    /// `fail_count < max_fail_count` whose backoff has elapsed. Ordered by
    /// priority descending, then depth ascending, then insertion order.
    async fn dequeue(&self, limit: usize, max_fail_count: i64) -> Result<Vec<FrontierItem>>;

    async fn mark_success(&self, url: &str, http_status: u16) -> Result<()>;

    async fn mark_error(
        &self,
        url: &str,
        error: &str,
        fail_count: i64,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Put a `success` row last touched before `older_than` back to `pending`.
    ///
    /// Used for seed pages, whose content changes as new publications appear.
    async fn requeue_if_stale(&self, url: &str, older_than: DateTime<Utc>) -> Result<bool>;

    /// Look up one frontier row.
    async fn frontier_item(&self, url: &str) -> Result<Option<FrontierItem>>;

    /// Delete `success` rows last touched before `older_than`.
    async fn prune_succeeded(&self, older_than: DateTime<Utc>) -> Result<u64>;

    /// Insert or replace the document keyed by its canonical URL.
    async fn upsert_document(&self, doc: &Document) -> Result<()>;

    async fn get_document(&self, canonical_url: &str) -> Result<Option<Document>>;

    /// Crawl health per source, ordered by source key.
    async fn source_stats(&self, max_fail_count: i64) -> Result<Vec<SourceStats>>;
}
