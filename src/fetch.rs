//! HTTP fetching.
//!
//! [`HttpFetcher`] owns one default client plus a per-host map of clients
//! with certificate validation relaxed. The map is built once from
//! `[tls].insecure_hosts` and nothing else ever skips validation. Redirects
//! are followed hop by hop so a relaxed host cannot hand a request off to
//! another host on the relaxed client.

use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE, LOCATION};
use reqwest::redirect::Policy;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use crate::config::Config;

/// A fetched resource after redirects.
#[derive(Debug, Clone)]
pub struct FetchedResource {
    /// URL after following redirects. Relative links resolve against this.
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url} redirected too many times")]
    TooManyRedirects { url: String },

    #[error("failed to read body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

const MAX_REDIRECTS: usize = 10;

/// Retrieves resources for the crawler.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url`. Non-2xx responses are errors.
    async fn fetch(&self, url: &str) -> Result<FetchedResource, FetchError>;
}

pub struct HttpFetcher {
    default_client: reqwest::Client,
    /// Host → client with certificate validation disabled.
    host_clients: HashMap<String, reqwest::Client>,
}

impl HttpFetcher {
    pub fn new(
        user_agent: &str,
        timeout: Duration,
        insecure_hosts: &[String],
    ) -> Result<Self, FetchError> {
        let default_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(Policy::none())
            .build()
            .map_err(FetchError::Client)?;

        let mut host_clients = HashMap::new();
        if !insecure_hosts.is_empty() {
            let insecure = reqwest::Client::builder()
                .user_agent(user_agent)
                .timeout(timeout)
                .redirect(Policy::none())
                .danger_accept_invalid_certs(true)
                .build()
                .map_err(FetchError::Client)?;
            for host in insecure_hosts {
                host_clients.insert(host.trim().to_ascii_lowercase(), insecure.clone());
            }
        }

        Ok(Self {
            default_client,
            host_clients,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        Self::new(
            &config.crawler.user_agent,
            Duration::from_secs(config.crawler.fetch_timeout_secs),
            &config.tls.insecure_hosts,
        )
    }

    /// True when requests to `host` skip certificate validation.
    pub fn relaxes_tls_for(&self, host: &str) -> bool {
        self.host_clients.contains_key(&host.to_ascii_lowercase())
    }

    fn client_for(&self, host: &str) -> &reqwest::Client {
        self.host_clients
            .get(&host.to_ascii_lowercase())
            .unwrap_or(&self.default_client)
    }
}

/// Resolve a `Location` header against the URL that produced it.
///
/// Only http(s) targets are followed.
fn redirect_target(current: &Url, location: Option<&HeaderValue>) -> Option<Url> {
    let location = location?.to_str().ok()?.trim();
    let next = current.join(location).ok()?;
    matches!(next.scheme(), "http" | "https").then_some(next)
}

#[async_trait]
impl Fetcher for HttpFetcher {
    /// Redirects are followed here rather than inside reqwest, so every hop
    /// picks its client by its own host.
    async fn fetch(&self, url: &str) -> Result<FetchedResource, FetchError> {
        let mut current = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;

        for _ in 0..=MAX_REDIRECTS {
            let host = current
                .host_str()
                .ok_or_else(|| FetchError::InvalidUrl(current.to_string()))?
                .to_string();

            let response = self
                .client_for(&host)
                .get(current.clone())
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        FetchError::Timeout {
                            url: url.to_string(),
                        }
                    } else {
                        FetchError::Network {
                            url: url.to_string(),
                            source: e,
                        }
                    }
                })?;

            let status = response.status();
            if status.is_redirection() {
                if let Some(next) = redirect_target(&current, response.headers().get(LOCATION)) {
                    current = next;
                    continue;
                }
            }
            if !status.is_success() {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());

            let body = response.bytes().await.map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout {
                        url: url.to_string(),
                    }
                } else {
                    FetchError::Body {
                        url: url.to_string(),
                        source: e,
                    }
                }
            })?;

            return Ok(FetchedResource {
                final_url: current.to_string(),
                status: status.as_u16(),
                content_type,
                body: body.to_vec(),
            });
        }

        Err(FetchError::TooManyRedirects {
            url: url.to_string(),
        })
    }
}
