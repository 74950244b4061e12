//! Core data models used throughout the mirror.
//!
//! These types represent the sources, frontier entries, documents and run
//! summaries that flow through the crawl pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Priority given to seed URLs declared by a source.
pub const SEED_PRIORITY: i64 = 10;
/// Priority given to links discovered in an RSS/Atom feed.
pub const FEED_LINK_PRIORITY: i64 = 5;
/// Priority given to links discovered in an HTML page.
pub const PAGE_LINK_PRIORITY: i64 = 0;

/// A crawl source and its boundary. Read-only to the crawler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    pub key: String,
    pub name: String,
    pub seed_urls: Vec<String>,
    pub allowed_hosts: Vec<String>,
    pub allowed_prefixes: Vec<String>,
    pub enabled: bool,
}

/// Lifecycle state of a frontier entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FrontierStatus {
    Pending,
    Success,
    Error,
}

impl FrontierStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrontierStatus::Pending => "pending",
            FrontierStatus::Success => "success",
            FrontierStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(FrontierStatus::Pending),
            "success" => Some(FrontierStatus::Success),
            "error" => Some(FrontierStatus::Error),
            _ => None,
        }
    }
}

/// A URL waiting to be enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFrontierItem {
    pub url: String,
    pub source_key: String,
    pub depth: i64,
    pub priority: i64,
}

/// A frontier row as returned by [`dequeue`](crate::store::CrawlStore::dequeue).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierItem {
    pub url: String,
    pub source_key: String,
    pub depth: i64,
    pub priority: i64,
    pub fail_count: i64,
    pub status: FrontierStatus,
}

/// Kind of document persisted in the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Html,
    Pdf,
    Xml,
    Doc,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Html => "html",
            DocType::Pdf => "pdf",
            DocType::Xml => "xml",
            DocType::Doc => "doc",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "html" => Some(DocType::Html),
            "pdf" => Some(DocType::Pdf),
            "xml" => Some(DocType::Xml),
            "doc" => Some(DocType::Doc),
            _ => None,
        }
    }
}

/// Canonical archived record for one URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub source_key: String,
    pub canonical_url: String,
    pub doc_type: DocType,
    pub title: Option<String>,
    pub content_text: Option<String>,
    /// Hex SHA-256 of the payload. Only set for binary documents.
    pub checksum: Option<String>,
    /// `{source_key}/{checksum}.pdf`. Only set for binary documents.
    pub storage_path: Option<String>,
    pub mime_type: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

/// Per-invocation summary returned to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub processed: u64,
    pub documents: u64,
    pub errors: u64,
    #[serde(rename = "newUrls")]
    pub new_urls: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_result_uses_camel_case_new_urls() {
        let result = RunResult {
            processed: 3,
            documents: 2,
            errors: 1,
            new_urls: 7,
        };
        let json = serde_json::to_value(result).unwrap();
        assert_eq!(json["newUrls"], 7);
        assert_eq!(json["processed"], 3);
        assert!(json.get("new_urls").is_none());
    }

    #[test]
    fn frontier_status_round_trips_through_str() {
        for status in [
            FrontierStatus::Pending,
            FrontierStatus::Success,
            FrontierStatus::Error,
        ] {
            assert_eq!(FrontierStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(FrontierStatus::parse("done"), None);
    }
}
