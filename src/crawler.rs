//! Bounded-batch crawl orchestration.
//!
//! One call to [`Crawler::run_batch`] is one crawl pass:
//!
//! ```text
//! enabled sources ──► seed frontier ──► dequeue N ──► for each item:
//!                                                     fetch → classify
//!                                                       ├─ asset → success
//!                                                       ├─ pdf   → blob + document
//!                                                       ├─ xml   → enqueue feed links
//!                                                       ├─ html  → document + enqueue links
//!                                                       └─ doc   → unsupported, success
//! ```
//!
//! Items are processed sequentially with a politeness delay between them.
//! A failing item is recorded with `mark_error` and the batch continues.
//! Every write is an idempotent upsert, so overlapping runs only repeat work.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::blob::{ContentStore, PDF_MIME};
use crate::canonical::canonicalize;
use crate::classify::{classify, ContentKind};
use crate::config::{Config, CrawlerConfig};
use crate::extract::{html_text, html_title, pdf_text, title_from_url};
use crate::fetch::{FetchedResource, Fetcher, HttpFetcher};
use crate::links::{extract_feed_links, extract_html_links};
use crate::models::{
    DocType, Document, FrontierItem, NewFrontierItem, RunResult, Source, FEED_LINK_PRIORITY,
    PAGE_LINK_PRIORITY, SEED_PRIORITY,
};
use crate::store::CrawlStore;

/// Delay before an item that has failed `fail_count` times becomes eligible
/// again: `retry_base_secs * 2^(fail_count - 1)`, capped at `retry_max_secs`.
pub fn retry_delay(config: &CrawlerConfig, fail_count: i64) -> chrono::Duration {
    let exp = (fail_count - 1).clamp(0, 32) as u32;
    let secs = config
        .retry_base_secs
        .max(0)
        .saturating_mul(1i64 << exp)
        .min(config.retry_max_secs.max(0));
    chrono::Duration::seconds(secs)
}

/// What processing one frontier item produced.
#[derive(Debug, Default)]
struct ItemOutcome {
    document: bool,
    new_urls: u64,
}

pub struct Crawler {
    store: Arc<dyn CrawlStore>,
    fetcher: Arc<dyn Fetcher>,
    blobs: ContentStore,
    config: CrawlerConfig,
}

impl Crawler {
    pub fn new(
        store: Arc<dyn CrawlStore>,
        fetcher: Arc<dyn Fetcher>,
        blobs: ContentStore,
        config: CrawlerConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            blobs,
            config,
        }
    }

    /// Build a crawler with the HTTP fetcher and blob backend from `config`.
    pub fn from_config(config: &Config, store: Arc<dyn CrawlStore>) -> Result<Self> {
        let fetcher = HttpFetcher::from_config(config).context("Failed to build HTTP fetcher")?;
        let blobs = ContentStore::from_config(config)?;
        Ok(Self::new(
            store,
            Arc::new(fetcher),
            blobs,
            config.crawler.clone(),
        ))
    }

    /// Run one bounded crawl pass.
    ///
    /// Only setup failures (loading sources, dequeueing) are returned as
    /// errors. Per-item failures are recorded on the frontier row and counted
    /// in [`RunResult::errors`].
    pub async fn run_batch(&self) -> Result<RunResult> {
        let sources = self
            .store
            .enabled_sources()
            .await
            .context("Failed to load enabled sources")?;
        info!(sources = sources.len(), "starting crawl run");

        self.seed(&sources).await;

        let items = self
            .store
            .dequeue(self.config.max_per_run, self.config.max_fail_count)
            .await
            .context("Failed to dequeue frontier items")?;
        info!(items = items.len(), "dequeued frontier batch");

        let by_key: HashMap<&str, &Source> =
            sources.iter().map(|s| (s.key.as_str(), s)).collect();
        let delay = Duration::from_millis(self.config.politeness_delay_ms);
        let mut result = RunResult::default();

        for (i, item) in items.iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            result.processed += 1;

            let source = by_key.get(item.source_key.as_str()).copied();
            match self.process_item(item, source).await {
                Ok(outcome) => {
                    if outcome.document {
                        result.documents += 1;
                    }
                    result.new_urls += outcome.new_urls;
                }
                Err(e) => {
                    result.errors += 1;
                    self.record_failure(item, &e).await;
                }
            }
        }

        info!(
            processed = result.processed,
            documents = result.documents,
            errors = result.errors,
            new_urls = result.new_urls,
            "crawl run finished"
        );
        Ok(result)
    }

    /// Enqueue every seed at depth 0. Seeds already crawled longer ago than
    /// `seed_refresh_secs` go back to `pending`. Failures are logged only.
    async fn seed(&self, sources: &[Source]) {
        let refresh_before = (self.config.seed_refresh_secs > 0)
            .then(|| Utc::now() - chrono::Duration::seconds(self.config.seed_refresh_secs));

        for source in sources {
            for seed in &source.seed_urls {
                let url = canonicalize(seed, None);
                let item = NewFrontierItem {
                    url: url.clone(),
                    source_key: source.key.clone(),
                    depth: 0,
                    priority: SEED_PRIORITY,
                };
                match self.store.enqueue(&item).await {
                    Ok(true) => debug!(url = %url, source = %source.key, "seed enqueued"),
                    Ok(false) => {
                        if let Some(before) = refresh_before {
                            match self.store.requeue_if_stale(&url, before).await {
                                Ok(true) => debug!(url = %url, "seed requeued for refresh"),
                                Ok(false) => {}
                                Err(e) => warn!(url = %url, error = %e, "seed refresh failed"),
                            }
                        }
                    }
                    Err(e) => {
                        warn!(url = %url, source = %source.key, error = %e, "failed to enqueue seed")
                    }
                }
            }
        }
    }

    #[tracing::instrument(
        name = "crawl_item",
        skip(self, item, source),
        fields(url = %item.url, source = %item.source_key, depth = item.depth)
    )]
    async fn process_item(
        &self,
        item: &FrontierItem,
        source: Option<&Source>,
    ) -> Result<ItemOutcome> {
        let source =
            source.ok_or_else(|| anyhow!("unknown or disabled source '{}'", item.source_key))?;

        let fetched = self.fetcher.fetch(&item.url).await?;
        let kind = classify(&fetched.final_url, fetched.content_type.as_deref());
        debug!(kind = kind.as_str(), status = fetched.status, "fetched");

        let outcome = match kind {
            ContentKind::Asset => ItemOutcome::default(),
            ContentKind::Pdf => self.store_pdf(item, &fetched).await?,
            ContentKind::Xml => self.follow_feed(item, source, &fetched).await,
            ContentKind::Html => self.store_html(item, source, &fetched).await?,
            ContentKind::Doc => {
                info!(kind = kind.as_str(), "skipping unsupported Word document");
                ItemOutcome::default()
            }
        };

        if let Err(e) = self.store.mark_success(&item.url, fetched.status).await {
            warn!(error = %e, "failed to mark item success");
        }
        Ok(outcome)
    }

    async fn store_pdf(
        &self,
        item: &FrontierItem,
        fetched: &FetchedResource,
    ) -> Result<ItemOutcome> {
        let blob = self
            .blobs
            .store(&item.source_key, &fetched.body)
            .await
            .with_context(|| format!("Failed to store PDF for {}", item.url))?;

        let bytes = fetched.body.clone();
        let max_chars = self.config.max_text_chars;
        let text = match tokio::task::spawn_blocking(move || pdf_text(&bytes, max_chars)).await {
            Ok(Ok(text)) => Some(text).filter(|t| !t.is_empty()),
            Ok(Err(e)) => {
                debug!(error = %e, "PDF text extraction failed");
                None
            }
            Err(e) => {
                warn!(error = %e, "PDF text extraction aborted");
                None
            }
        };

        let doc = Document {
            source_key: item.source_key.clone(),
            canonical_url: item.url.clone(),
            doc_type: DocType::Pdf,
            title: Some(title_from_url(&item.url)),
            content_text: text,
            checksum: Some(blob.checksum),
            storage_path: Some(blob.storage_path),
            mime_type: Some(PDF_MIME.to_string()),
            fetched_at: Utc::now(),
        };
        self.store.upsert_document(&doc).await?;

        Ok(ItemOutcome {
            document: true,
            new_urls: 0,
        })
    }

    async fn follow_feed(
        &self,
        item: &FrontierItem,
        source: &Source,
        fetched: &FetchedResource,
    ) -> ItemOutcome {
        // Feeds may link to further feeds; stop at twice the page depth.
        if item.depth >= self.config.max_depth.saturating_mul(2) {
            debug!(depth = item.depth, "feed links not followed past depth limit");
            return ItemOutcome {
                document: false,
                new_urls: 0,
            };
        }

        let xml = String::from_utf8_lossy(&fetched.body);
        let links = extract_feed_links(
            &xml,
            &fetched.final_url,
            source,
            &self.config.feed_relaxed_domain,
        );
        let new_urls = self
            .enqueue_links(item, links, self.config.feed_link_cap, FEED_LINK_PRIORITY)
            .await;

        ItemOutcome {
            document: false,
            new_urls,
        }
    }

    async fn store_html(
        &self,
        item: &FrontierItem,
        source: &Source,
        fetched: &FetchedResource,
    ) -> Result<ItemOutcome> {
        let html = String::from_utf8_lossy(&fetched.body);
        let text = html_text(&html, self.config.max_text_chars);

        let doc = Document {
            source_key: item.source_key.clone(),
            canonical_url: item.url.clone(),
            doc_type: DocType::Html,
            title: html_title(&html),
            content_text: Some(text).filter(|t| !t.is_empty()),
            checksum: None,
            storage_path: None,
            mime_type: Some(
                fetched
                    .content_type
                    .clone()
                    .unwrap_or_else(|| "text/html".to_string()),
            ),
            fetched_at: Utc::now(),
        };
        self.store.upsert_document(&doc).await?;

        let new_urls = if item.depth < self.config.max_depth {
            let links = extract_html_links(&html, &fetched.final_url, source);
            self.enqueue_links(item, links, self.config.html_link_cap, PAGE_LINK_PRIORITY)
                .await
        } else {
            0
        };

        Ok(ItemOutcome {
            document: true,
            new_urls,
        })
    }

    /// Enqueue up to `cap` links one hop below `parent`. Returns how many
    /// rows were actually created.
    async fn enqueue_links(
        &self,
        parent: &FrontierItem,
        links: Vec<String>,
        cap: usize,
        priority: i64,
    ) -> u64 {
        let mut created = 0;
        for url in links.into_iter().take(cap) {
            let item = NewFrontierItem {
                url,
                source_key: parent.source_key.clone(),
                depth: parent.depth + 1,
                priority,
            };
            match self.store.enqueue(&item).await {
                Ok(true) => created += 1,
                Ok(false) => {}
                Err(e) => warn!(url = %item.url, error = %e, "failed to enqueue link"),
            }
        }
        created
    }

    async fn record_failure(&self, item: &FrontierItem, error: &anyhow::Error) {
        let fail_count = item.fail_count + 1;
        let next_attempt_at = Utc::now() + retry_delay(&self.config, fail_count);
        let message = format!("{:#}", error);
        warn!(
            url = %item.url,
            source = %item.source_key,
            fail_count,
            error = %message,
            "crawl item failed"
        );
        if let Err(e) = self
            .store
            .mark_error(&item.url, &message, fail_count, next_attempt_at)
            .await
        {
            warn!(url = %item.url, error = %e, "failed to record item error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CrawlerConfig {
        CrawlerConfig {
            retry_base_secs: 3600,
            retry_max_secs: 7 * 24 * 3600,
            ..Default::default()
        }
    }

    #[test]
    fn backoff_doubles_per_failure() {
        let cfg = config();
        assert_eq!(retry_delay(&cfg, 1).num_seconds(), 3600);
        assert_eq!(retry_delay(&cfg, 2).num_seconds(), 7200);
        assert_eq!(retry_delay(&cfg, 4).num_seconds(), 28800);
    }

    #[test]
    fn backoff_is_capped() {
        let cfg = config();
        assert_eq!(retry_delay(&cfg, 10).num_seconds(), 7 * 24 * 3600);
        assert_eq!(retry_delay(&cfg, 500).num_seconds(), 7 * 24 * 3600);
    }

    #[test]
    fn zero_base_retries_immediately() {
        let cfg = CrawlerConfig {
            retry_base_secs: 0,
            ..config()
        };
        assert_eq!(retry_delay(&cfg, 3).num_seconds(), 0);
    }
}
