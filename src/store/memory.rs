//! In-memory [`CrawlStore`] implementation for tests and embedding.
//!
//! Uses `BTreeMap`/`HashMap` behind `std::sync::RwLock`. Insertion order is
//! tracked with a sequence number so dequeue ties break the same way the
//! SQLite store breaks them.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Document, FrontierItem, FrontierStatus, NewFrontierItem, Source};

use super::{CrawlStore, SourceStats};

struct QueueRow {
    item: FrontierItem,
    seq: u64,
    last_error: Option<String>,
    http_status: Option<u16>,
    next_attempt_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct Queue {
    rows: HashMap<String, QueueRow>,
    next_seq: u64,
}

/// In-memory store. Nothing survives the process.
pub struct MemoryStore {
    sources: RwLock<BTreeMap<String, Source>>,
    queue: RwLock<Queue>,
    documents: RwLock<HashMap<String, Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(BTreeMap::new()),
            queue: RwLock::new(Queue::default()),
            documents: RwLock::new(HashMap::new()),
        }
    }

    /// Number of frontier rows, regardless of status.
    pub fn frontier_len(&self) -> usize {
        self.queue.read().unwrap().rows.len()
    }

    /// Number of stored documents.
    pub fn document_count(&self) -> usize {
        self.documents.read().unwrap().len()
    }

    /// Last recorded error message for a frontier row.
    pub fn last_error(&self, url: &str) -> Option<String> {
        self.queue
            .read()
            .unwrap()
            .rows
            .get(url)
            .and_then(|r| r.last_error.clone())
    }

    pub fn http_status(&self, url: &str) -> Option<u16> {
        self.queue
            .read()
            .unwrap()
            .rows
            .get(url)
            .and_then(|r| r.http_status)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CrawlStore for MemoryStore {
    async fn upsert_source(&self, source: &Source) -> Result<()> {
        self.sources
            .write()
            .unwrap()
            .insert(source.key.clone(), source.clone());
        Ok(())
    }

    async fn list_sources(&self) -> Result<Vec<Source>> {
        Ok(self.sources.read().unwrap().values().cloned().collect())
    }

    async fn enqueue(&self, item: &NewFrontierItem) -> Result<bool> {
        let mut queue = self.queue.write().unwrap();
        if queue.rows.contains_key(&item.url) {
            return Ok(false);
        }
        let seq = queue.next_seq;
        queue.next_seq += 1;
        let now = Utc::now();
        queue.rows.insert(
            item.url.clone(),
            QueueRow {
                item: FrontierItem {
                    url: item.url.clone(),
                    source_key: item.source_key.clone(),
                    depth: item.depth,
                    priority: item.priority,
                    fail_count: 0,
                    status: FrontierStatus::Pending,
                },
                seq,
                last_error: None,
                http_status: None,
                next_attempt_at: now,
                updated_at: now,
            },
        );
        Ok(true)
    }

    async fn dequeue(&self, limit: usize, max_fail_count: i64) -> Result<Vec<FrontierItem>> {
        let now = Utc::now();
        let queue = self.queue.read().unwrap();
        let mut eligible: Vec<&QueueRow> = queue
            .rows
            .values()
            .filter(|r| match r.item.status {
                FrontierStatus::Pending => true,
                FrontierStatus::Error => {
                    r.item.fail_count < max_fail_count && r.next_attempt_at <= now
                }
                FrontierStatus::Success => false,
            })
            .collect();

        eligible.sort_by(|a, b| {
            b.item
                .priority
                .cmp(&a.item.priority)
                .then(a.item.depth.cmp(&b.item.depth))
                .then(a.seq.cmp(&b.seq))
        });

        Ok(eligible
            .into_iter()
            .take(limit)
            .map(|r| r.item.clone())
            .collect())
    }

    async fn mark_success(&self, url: &str, http_status: u16) -> Result<()> {
        let mut queue = self.queue.write().unwrap();
        if let Some(row) = queue.rows.get_mut(url) {
            row.item.status = FrontierStatus::Success;
            row.http_status = Some(http_status);
            row.last_error = None;
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_error(
        &self,
        url: &str,
        error: &str,
        fail_count: i64,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut queue = self.queue.write().unwrap();
        if let Some(row) = queue.rows.get_mut(url) {
            row.item.status = FrontierStatus::Error;
            row.item.fail_count = fail_count;
            row.last_error = Some(error.to_string());
            row.next_attempt_at = next_attempt_at;
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn requeue_if_stale(&self, url: &str, older_than: DateTime<Utc>) -> Result<bool> {
        let mut queue = self.queue.write().unwrap();
        match queue.rows.get_mut(url) {
            Some(row)
                if row.item.status == FrontierStatus::Success && row.updated_at < older_than =>
            {
                row.item.status = FrontierStatus::Pending;
                row.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn frontier_item(&self, url: &str) -> Result<Option<FrontierItem>> {
        Ok(self
            .queue
            .read()
            .unwrap()
            .rows
            .get(url)
            .map(|r| r.item.clone()))
    }

    async fn prune_succeeded(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let mut queue = self.queue.write().unwrap();
        let before = queue.rows.len();
        queue
            .rows
            .retain(|_, r| !(r.item.status == FrontierStatus::Success && r.updated_at < older_than));
        Ok((before - queue.rows.len()) as u64)
    }

    async fn upsert_document(&self, doc: &Document) -> Result<()> {
        self.documents
            .write()
            .unwrap()
            .insert(doc.canonical_url.clone(), doc.clone());
        Ok(())
    }

    async fn get_document(&self, canonical_url: &str) -> Result<Option<Document>> {
        Ok(self.documents.read().unwrap().get(canonical_url).cloned())
    }

    async fn source_stats(&self, max_fail_count: i64) -> Result<Vec<SourceStats>> {
        let mut stats: BTreeMap<String, SourceStats> = BTreeMap::new();

        for row in self.queue.read().unwrap().rows.values() {
            let s = stats
                .entry(row.item.source_key.clone())
                .or_insert_with(|| SourceStats {
                    source_key: row.item.source_key.clone(),
                    ..Default::default()
                });
            match row.item.status {
                FrontierStatus::Pending => s.pending += 1,
                FrontierStatus::Success => s.succeeded += 1,
                FrontierStatus::Error => {
                    s.failed += 1;
                    if row.item.fail_count >= max_fail_count {
                        s.exhausted += 1;
                    }
                }
            }
        }

        for doc in self.documents.read().unwrap().values() {
            let s = stats
                .entry(doc.source_key.clone())
                .or_insert_with(|| SourceStats {
                    source_key: doc.source_key.clone(),
                    ..Default::default()
                });
            s.documents += 1;
            let ts = doc.fetched_at.timestamp();
            s.last_fetched_at = Some(s.last_fetched_at.map_or(ts, |prev| prev.max(ts)));
        }

        Ok(stats.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(url: &str, depth: i64, priority: i64) -> NewFrontierItem {
        NewFrontierItem {
            url: url.to_string(),
            source_key: "dre".to_string(),
            depth,
            priority,
        }
    }

    #[tokio::test]
    async fn enqueue_keeps_first_seen_row() {
        let store = MemoryStore::new();
        assert!(store.enqueue(&item("https://dre.pt/a", 0, 10)).await.unwrap());
        assert!(!store.enqueue(&item("https://dre.pt/a", 2, 0)).await.unwrap());
        assert_eq!(store.frontier_len(), 1);
        let row = store.frontier_item("https://dre.pt/a").await.unwrap().unwrap();
        assert_eq!(row.priority, 10);
    }

    #[tokio::test]
    async fn dequeue_ties_break_by_insertion_order() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .enqueue(&item(&format!("https://dre.pt/{}", i), 1, 0))
                .await
                .unwrap();
        }
        let urls: Vec<String> = store
            .dequeue(3, 5)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.url)
            .collect();
        assert_eq!(
            urls,
            vec!["https://dre.pt/0", "https://dre.pt/1", "https://dre.pt/2"]
        );
    }

    #[tokio::test]
    async fn exhausted_rows_are_never_dequeued() {
        let store = MemoryStore::new();
        store.enqueue(&item("https://dre.pt/a", 0, 0)).await.unwrap();
        let past = Utc::now() - chrono::Duration::seconds(1);
        store
            .mark_error("https://dre.pt/a", "HTTP 500", 5, past)
            .await
            .unwrap();
        assert!(store.dequeue(10, 5).await.unwrap().is_empty());
        assert_eq!(store.dequeue(10, 6).await.unwrap().len(), 1);
        assert_eq!(store.last_error("https://dre.pt/a").as_deref(), Some("HTTP 500"));

        let stats = store.source_stats(5).await.unwrap();
        assert_eq!(stats[0].exhausted, 1);
    }

    #[tokio::test]
    async fn stale_success_goes_back_to_pending() {
        let store = MemoryStore::new();
        store.enqueue(&item("https://dre.pt/seed", 0, 10)).await.unwrap();
        store.mark_success("https://dre.pt/seed", 200).await.unwrap();
        assert!(store.dequeue(10, 5).await.unwrap().is_empty());

        let future = Utc::now() + chrono::Duration::seconds(60);
        assert!(store
            .requeue_if_stale("https://dre.pt/seed", future)
            .await
            .unwrap());
        assert_eq!(store.dequeue(10, 5).await.unwrap().len(), 1);
    }
}
