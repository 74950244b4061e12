//! Content-addressed blob storage.
//!
//! Binary payloads are stored at `{source_key}/{sha256}.pdf`, so the same
//! bytes always land on the same path and two URLs serving identical files
//! share one blob. Writes overwrite, which makes them idempotent without an
//! existence check.
//!
//! # Backends
//!
//! | Backend | Config | Notes |
//! |---------|--------|-------|
//! | `fs` | `storage.root` | `root/bucket/path`, written via temp file + rename |
//! | `s3` | `storage.region`, `storage.endpoint_url` | `PUT Object` signed with AWS SigV4 |
//!
//! The `s3` backend reads credentials from `AWS_ACCESS_KEY_ID`,
//! `AWS_SECRET_ACCESS_KEY` and optionally `AWS_SESSION_TOKEN`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::Config;

pub const PDF_MIME: &str = "application/pdf";

/// Result of storing a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub checksum: String,
    pub storage_path: String,
}

/// Hex-encoded SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Deterministic storage path for a payload of a source.
pub fn storage_path(source_key: &str, checksum: &str) -> String {
    format!("{}/{}.pdf", source_key, checksum)
}

/// Object storage collaborator with upsert-on-path semantics.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, bucket: &str, path: &str, bytes: &[u8], content_type: &str)
        -> Result<()>;
}

/// Hashes payloads and writes them through a [`BlobStore`].
#[derive(Clone)]
pub struct ContentStore {
    backend: Arc<dyn BlobStore>,
    bucket: String,
}

impl ContentStore {
    pub fn new(backend: Arc<dyn BlobStore>, bucket: impl Into<String>) -> Self {
        Self {
            backend,
            bucket: bucket.into(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let backend: Arc<dyn BlobStore> = match config.storage.backend.as_str() {
            "fs" => {
                let root = config
                    .storage
                    .root
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("storage.root is required for fs backend"))?;
                Arc::new(FsBlobStore::new(root))
            }
            "s3" => Arc::new(S3BlobStore::from_env(
                config.storage.region.clone(),
                config.storage.endpoint_url.clone(),
            )?),
            other => bail!("Unknown storage backend: '{}'", other),
        };
        Ok(Self::new(backend, config.storage.bucket.clone()))
    }

    /// Store a PDF payload for `source_key`.
    pub async fn store(&self, source_key: &str, bytes: &[u8]) -> Result<StoredBlob> {
        let checksum = sha256_hex(bytes);
        let path = storage_path(source_key, &checksum);
        self.backend
            .put(&self.bucket, &path, bytes, PDF_MIME)
            .await
            .with_context(|| format!("Failed to store blob {}/{}", self.bucket, path))?;
        Ok(StoredBlob {
            checksum,
            storage_path: path,
        })
    }
}

// ============ Filesystem backend ============

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Stores blobs as plain files under `root/bucket/path`.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, bucket: &str, path: &str) -> Result<PathBuf> {
        let relative = Path::new(bucket).join(path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("refusing non-normal blob path: {}", relative.display());
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<()> {
        let target = self.resolve(bucket, path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        // Unique per write, across processes and within one.
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = target.with_extension(format!("tmp-{}-{}", std::process::id(), seq));
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e)
                .with_context(|| format!("Failed to move blob into {}", target.display()));
        }
        Ok(())
    }
}

// ============ S3 backend ============

type HmacSha256 = Hmac<Sha256>;

/// AWS credentials loaded from environment variables.
struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

/// Writes blobs to S3 or an S3-compatible service with signed `PUT Object`.
pub struct S3BlobStore {
    region: String,
    /// Custom endpoint (MinIO, LocalStack). Uses path-style addressing.
    endpoint_url: Option<String>,
    creds: AwsCredentials,
    client: reqwest::Client,
}

impl S3BlobStore {
    pub fn from_env(region: String, endpoint_url: Option<String>) -> Result<Self> {
        Ok(Self {
            region,
            endpoint_url,
            creds: AwsCredentials::from_env()?,
            client: reqwest::Client::new(),
        })
    }

    /// Returns `(scheme, host, canonical_uri)` for an object.
    fn object_location(&self, bucket: &str, path: &str) -> (String, String, String) {
        let encoded_key = path.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        match self.endpoint_url {
            Some(ref endpoint) => {
                let scheme = if endpoint.starts_with("http://") {
                    "http"
                } else {
                    "https"
                };
                let host = endpoint
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/')
                    .to_string();
                (
                    scheme.to_string(),
                    host,
                    format!("/{}/{}", uri_encode(bucket), encoded_key),
                )
            }
            None => (
                "https".to_string(),
                format!("{}.s3.{}.amazonaws.com", bucket, self.region),
                format!("/{}", encoded_key),
            ),
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<()> {
        let (scheme, host, canonical_uri) = self.object_location(bucket, path);
        let url = format!("{}://{}{}", scheme, host, canonical_uri);

        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = sha256_hex(bytes);

        let mut headers = vec![
            ("content-type".to_string(), content_type.to_string()),
            ("host".to_string(), host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(ref token) = self.creds.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_request = format!(
            "PUT\n{}\n\n{}\n{}\n{}",
            canonical_uri, canonical_headers, signed_headers, payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            sha256_hex(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            &self.creds.secret_access_key,
            &date_stamp,
            &self.region,
            "s3",
        );
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.creds.access_key_id, credential_scope, signed_headers, signature
        );

        let mut req_builder = self
            .client
            .put(&url)
            .header("Authorization", &authorization)
            .header("Content-Type", content_type)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date)
            .body(bytes.to_vec());

        if let Some(ref token) = self.creds.session_token {
            req_builder = req_builder.header("x-amz-security-token", token);
        }

        let resp = req_builder
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to put s3://{}/{}: {}", bucket, path, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "S3 PutObject failed (HTTP {}) for s3://{}/{}: {}",
                status,
                bucket,
                path,
                body.chars().take(500).collect::<String>()
            );
        }

        Ok(())
    }
}

// ============ AWS SigV4 Helpers ============

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Derive the AWS SigV4 signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode a path segment per RFC 3986 (unreserved characters pass through).
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn checksum_is_hex_sha256() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn same_bytes_same_path() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::new(Arc::new(FsBlobStore::new(tmp.path())), "docs");

        let first = store.store("dre", b"%PDF-1.4 same").await.unwrap();
        let second = store.store("dre", b"%PDF-1.4 same").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first.storage_path,
            format!("dre/{}.pdf", sha256_hex(b"%PDF-1.4 same"))
        );

        let source_dir = tmp.path().join("docs").join("dre");
        let files: Vec<_> = std::fs::read_dir(&source_dir).unwrap().collect();
        assert_eq!(files.len(), 1, "identical payloads must share one blob");
        let on_disk = std::fs::read(tmp.path().join("docs").join(&first.storage_path)).unwrap();
        assert_eq!(on_disk, b"%PDF-1.4 same");
    }

    #[tokio::test]
    async fn different_bytes_different_paths() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::new(Arc::new(FsBlobStore::new(tmp.path())), "docs");
        let a = store.store("dre", b"one").await.unwrap();
        let b = store.store("dre", b"two").await.unwrap();
        assert_ne!(a.storage_path, b.storage_path);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_of_one_blob_all_succeed() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::new(Arc::new(FsBlobStore::new(tmp.path())), "docs");
        let payload = vec![b'x'; 1024 * 1024];

        for _ in 0..20 {
            let (a, b) = tokio::join!(
                tokio::spawn({
                    let store = store.clone();
                    let payload = payload.clone();
                    async move { store.store("dre", &payload).await }
                }),
                tokio::spawn({
                    let store = store.clone();
                    let payload = payload.clone();
                    async move { store.store("dre", &payload).await }
                }),
            );
            let a = a.unwrap().unwrap();
            let b = b.unwrap().unwrap();
            assert_eq!(a, b);
        }

        let source_dir = tmp.path().join("docs").join("dre");
        let files: Vec<_> = std::fs::read_dir(&source_dir).unwrap().collect();
        assert_eq!(files.len(), 1, "no temp files left behind");
        let on_disk = std::fs::read(source_dir.join(format!("{}.pdf", sha256_hex(&payload))));
        assert_eq!(on_disk.unwrap(), payload);
    }

    #[tokio::test]
    async fn fs_rejects_traversal() {
        let tmp = TempDir::new().unwrap();
        let fs = FsBlobStore::new(tmp.path());
        assert!(fs.put("docs", "../escape.pdf", b"x", PDF_MIME).await.is_err());
    }

    #[test]
    fn signing_key_matches_aws_reference() {
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn uri_encode_escapes_reserved() {
        assert_eq!(uri_encode("a b+c"), "a%20b%2Bc");
        assert_eq!(uri_encode("abc-._~"), "abc-._~");
    }
}
