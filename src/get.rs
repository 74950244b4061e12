//! Archived document lookup by URL.
//!
//! The argument is canonicalized first, so `lexm get "https://DRE.pt/a#x"`
//! finds the row stored for `https://dre.pt/a`.

use anyhow::{bail, Result};
use serde::Serialize;

use crate::canonical::canonicalize;
use crate::config::Config;
use crate::models::Document;
use crate::store::{CrawlStore, SqliteStore};

/// JSON shape printed by `lexm get --json`.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentResponse {
    pub canonical_url: String,
    pub source_key: String,
    pub doc_type: String,
    pub title: Option<String>,
    pub mime_type: Option<String>,
    pub checksum: Option<String>,
    pub storage_path: Option<String>,
    pub fetched_at: String, // ISO8601
    pub content_text: Option<String>,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        Self {
            canonical_url: doc.canonical_url,
            source_key: doc.source_key,
            doc_type: doc.doc_type.as_str().to_string(),
            title: doc.title,
            mime_type: doc.mime_type,
            checksum: doc.checksum,
            storage_path: doc.storage_path,
            fetched_at: doc.fetched_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            content_text: doc.content_text,
        }
    }
}

/// Look up the document stored for `url`.
pub async fn get_document(store: &dyn CrawlStore, url: &str) -> Result<DocumentResponse> {
    let canonical = canonicalize(url, None);
    if url::Url::parse(&canonical).is_err() {
        bail!("invalid URL: {}", url);
    }
    match store.get_document(&canonical).await? {
        Some(doc) => Ok(doc.into()),
        None => bail!("document not found: {}", canonical),
    }
}

/// CLI entry point for `lexm get`.
pub async fn run_get(config: &Config, url: &str, json: bool) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let result = get_document(&store, url).await;
    store.close().await;
    let doc = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("--- Document ---");
    println!("url:          {}", doc.canonical_url);
    println!("source:       {}", doc.source_key);
    println!("type:         {}", doc.doc_type);
    println!("title:        {}", doc.title.as_deref().unwrap_or("(none)"));
    println!("mime_type:    {}", doc.mime_type.as_deref().unwrap_or("(none)"));
    println!("fetched_at:   {}", doc.fetched_at);
    if let Some(path) = &doc.storage_path {
        println!("storage_path: {}", path);
    }
    if let Some(checksum) = &doc.checksum {
        println!("checksum:     {}", checksum);
    }
    println!();
    match &doc.content_text {
        Some(text) => {
            let preview: String = text.chars().take(2000).collect();
            println!("{}", preview);
            if text.chars().count() > 2000 {
                println!("... ({} characters total)", text.chars().count());
            }
        }
        None => println!("(no extracted text)"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocType;
    use crate::store::MemoryStore;
    use chrono::Utc;

    #[tokio::test]
    async fn lookup_canonicalizes_the_argument() {
        let store = MemoryStore::new();
        store
            .upsert_document(&Document {
                source_key: "dre".to_string(),
                canonical_url: "https://dre.pt/legislacao/1".to_string(),
                doc_type: DocType::Html,
                title: Some("Lei 1".to_string()),
                content_text: None,
                checksum: None,
                storage_path: None,
                mime_type: Some("text/html".to_string()),
                fetched_at: Utc::now(),
            })
            .await
            .unwrap();

        let doc = get_document(&store, "HTTPS://DRE.PT/legislacao/1#topo")
            .await
            .unwrap();
        assert_eq!(doc.title.as_deref(), Some("Lei 1"));
        assert_eq!(doc.doc_type, "html");
    }

    #[tokio::test]
    async fn missing_document_is_an_error() {
        let store = MemoryStore::new();
        let err = get_document(&store, "https://dre.pt/nada")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
