//! Vector store snapshots in S3.
//!
//! The web tier uploads its vector store file before dispatching a query so
//! that the worker, which has no local state, can download the same file.

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::aws::{encode_path, AwsClient, AwsRequest};
use crate::config::Config;

const S3_TIMEOUT_SECS: u64 = 120;

pub struct SnapshotStore {
    client: AwsClient,
    bucket: String,
}

impl SnapshotStore {
    pub fn new(client: AwsClient, bucket: String) -> Self {
        Self { client, bucket }
    }

    /// `None` when no `[storage].bucket` is configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        let Some(ref bucket) = config.storage.bucket else {
            return Ok(None);
        };
        let client = AwsClient::from_env(&config.aws, Duration::from_secs(S3_TIMEOUT_SECS))?;
        Ok(Some(Self::new(client, bucket.clone())))
    }

    /// Host and path for `key`: virtual-hosted style against AWS, path style
    /// against a custom endpoint.
    fn object_location(&self, key: &str) -> (String, String) {
        let key = encode_path(key.trim_start_matches('/'));
        if self.client.has_custom_endpoint() {
            (
                format!("s3.{}.amazonaws.com", self.client.region()),
                format!("/{}/{}", self.bucket, key),
            )
        } else {
            (
                format!("{}.s3.{}.amazonaws.com", self.bucket, self.client.region()),
                format!("/{}", key),
            )
        }
    }

    pub async fn upload_file(&self, path: &Path, key: &str) -> Result<()> {
        let body = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let size = body.len();
        let (host, object_path) = self.object_location(key);

        self.client
            .send(AwsRequest {
                service: "s3",
                host,
                method: reqwest::Method::PUT,
                path: object_path,
                headers: vec![(
                    "content-type".to_string(),
                    "application/octet-stream".to_string(),
                )],
                body,
            })
            .await?;

        info!(bucket = %self.bucket, key, bytes = size, "uploaded snapshot");
        Ok(())
    }

    pub async fn download_file(&self, key: &str, path: &Path) -> Result<()> {
        let (host, object_path) = self.object_location(key);
        let resp = self
            .client
            .send(AwsRequest {
                service: "s3",
                host,
                method: reqwest::Method::GET,
                path: object_path,
                headers: Vec::new(),
                body: Vec::new(),
            })
            .await?;
        let bytes = resp.bytes().await?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        info!(bucket = %self.bucket, key, bytes = bytes.len(), "downloaded snapshot");
        Ok(())
    }
}
