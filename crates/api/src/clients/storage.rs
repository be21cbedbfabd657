//! Artifact object storage.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::StorageConfig;

/// Errors that can occur when storing an artifact.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("upload failed: {0}")]
    Upload(String),
}

impl StorageError {
    /// Whether retrying the upload may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Upload(_))
    }
}

/// Write-once blob storage that hands back a stable public URL.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` under `key` and return the URL the artifact is served from.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str)
    -> Result<String, StorageError>;
}

/// Amazon S3 artifact store.
#[derive(Clone)]
pub struct S3ArtifactStore {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl S3ArtifactStore {
    /// Build a store from a loaded AWS SDK configuration.
    #[must_use]
    pub fn new(sdk_config: &aws_config::SdkConfig, config: &StorageConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
            bucket: config.bucket.clone(),
            public_base_url: public_base_url(config),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{key}", self.public_base_url)
    }
}

/// The configured public URL prefix, or the bucket's virtual-hosted S3 URL.
fn public_base_url(config: &StorageConfig) -> String {
    config.public_base_url.as_ref().map_or_else(
        || format!("https://{}.s3.{}.amazonaws.com", config.bucket, config.region),
        |url| url.trim_end_matches('/').to_owned(),
    )
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    #[instrument(skip(self, bytes), fields(bucket = %self.bucket, size = bytes.len()))]
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::Upload(e.to_string()))?;

        debug!(key, "Artifact uploaded");
        Ok(self.public_url(key))
    }
}
