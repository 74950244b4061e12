//! TOML configuration parsing and validation.
//!
//! A single file declares the database location, crawl limits, TLS
//! exceptions, blob storage backend, HTTP bind address and the source
//! registry (`[sources.<key>]`).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::models::Source;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrawlerConfig {
    #[serde(default = "default_max_per_run")]
    pub max_per_run: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: i64,
    #[serde(default = "default_politeness_delay_ms")]
    pub politeness_delay_ms: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_html_link_cap")]
    pub html_link_cap: usize,
    #[serde(default = "default_feed_link_cap")]
    pub feed_link_cap: usize,
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
    #[serde(default = "default_max_fail_count")]
    pub max_fail_count: i64,
    #[serde(default = "default_retry_base_secs")]
    pub retry_base_secs: i64,
    #[serde(default = "default_retry_max_secs")]
    pub retry_max_secs: i64,
    #[serde(default = "default_feed_relaxed_domain")]
    pub feed_relaxed_domain: String,
    /// Seeds fetched longer ago than this go back to `pending`. 0 disables.
    #[serde(default = "default_seed_refresh_secs")]
    pub seed_refresh_secs: i64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_per_run: default_max_per_run(),
            max_depth: default_max_depth(),
            politeness_delay_ms: default_politeness_delay_ms(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            user_agent: default_user_agent(),
            html_link_cap: default_html_link_cap(),
            feed_link_cap: default_feed_link_cap(),
            max_text_chars: default_max_text_chars(),
            max_fail_count: default_max_fail_count(),
            retry_base_secs: default_retry_base_secs(),
            retry_max_secs: default_retry_max_secs(),
            feed_relaxed_domain: default_feed_relaxed_domain(),
            seed_refresh_secs: default_seed_refresh_secs(),
        }
    }
}

fn default_max_per_run() -> usize {
    30
}
fn default_max_depth() -> i64 {
    3
}
fn default_politeness_delay_ms() -> u64 {
    300
}
fn default_fetch_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    format!(
        "legal-mirror/{} (legal publications archiver)",
        env!("CARGO_PKG_VERSION")
    )
}
fn default_html_link_cap() -> usize {
    50
}
fn default_feed_link_cap() -> usize {
    100
}
fn default_max_text_chars() -> usize {
    500_000
}
fn default_max_fail_count() -> i64 {
    5
}
fn default_retry_base_secs() -> i64 {
    3600
}
fn default_retry_max_secs() -> i64 {
    7 * 24 * 3600
}
fn default_feed_relaxed_domain() -> String {
    "dre.pt".to_string()
}
fn default_seed_refresh_secs() -> i64 {
    24 * 3600
}

/// Hosts whose certificate chains are known to be broken. Validation is
/// relaxed for exactly these hosts and nothing else.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TlsConfig {
    #[serde(default)]
    pub insecure_hosts: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Root directory for the `fs` backend.
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

fn default_backend() -> String {
    "fs".to_string()
}
fn default_bucket() -> String {
    "legal-documents".to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub name: String,
    pub seed_urls: Vec<String>,
    pub allowed_hosts: Vec<String>,
    #[serde(default)]
    pub allowed_prefixes: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Config {
    /// The configured sources as registry entries, ordered by key.
    pub fn source_registry(&self) -> Vec<Source> {
        self.sources
            .iter()
            .map(|(key, sc)| Source {
                key: key.clone(),
                name: sc.name.clone(),
                seed_urls: sc.seed_urls.clone(),
                allowed_hosts: sc.allowed_hosts.clone(),
                allowed_prefixes: sc.allowed_prefixes.clone(),
                enabled: sc.enabled,
            })
            .collect()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate crawler limits
    if config.crawler.max_per_run == 0 {
        anyhow::bail!("crawler.max_per_run must be >= 1");
    }
    if config.crawler.fetch_timeout_secs == 0 {
        anyhow::bail!("crawler.fetch_timeout_secs must be >= 1");
    }
    if config.crawler.max_fail_count < 1 {
        anyhow::bail!("crawler.max_fail_count must be >= 1");
    }
    if config.crawler.max_depth < 0 {
        anyhow::bail!("crawler.max_depth must be >= 0");
    }

    // Validate storage
    match config.storage.backend.as_str() {
        "fs" => {
            if config.storage.root.is_none() {
                anyhow::bail!("storage.root must be set when backend is 'fs'");
            }
        }
        "s3" => {}
        other => anyhow::bail!("Unknown storage backend: '{}'. Must be fs or s3.", other),
    }

    // Validate sources
    for (key, source) in &config.sources {
        if source.seed_urls.is_empty() {
            anyhow::bail!("sources.{}.seed_urls must not be empty", key);
        }
        if source.allowed_hosts.is_empty() {
            anyhow::bail!("sources.{}.allowed_hosts must not be empty", key);
        }
        for seed in &source.seed_urls {
            url::Url::parse(seed)
                .with_context(|| format!("sources.{}: invalid seed URL '{}'", key, seed))?;
        }
    }

    Ok(config)
}
