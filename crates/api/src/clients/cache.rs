//! Request cache: pending generation markers and artifact URLs.
//!
//! Nothing reads these entries on the request path; they exist for
//! debugging and for quick artifact lookups by other tools. Callers log
//! failures and carry on.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::Utc;
use moka::future::Cache;
use thiserror::Error;
use tracing::instrument;

use tee_studio_core::{DesignId, UserId};

use crate::config::DynamoTables;

/// How long in-process entries live.
const MEMORY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound on in-process entries per map.
const MEMORY_CAPACITY: u64 = 10_000;

/// Errors that can occur when writing to the request cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache write failed: {0}")]
    Write(String),
}

impl CacheError {
    /// Whether retrying the write may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Write(_))
    }
}

/// Key-value record of generation requests and their artifacts.
#[async_trait]
pub trait RequestCache: Send + Sync {
    /// Record that a generation request is in flight.
    async fn record_request(
        &self,
        request_id: &str,
        user_id: UserId,
        prompt: &str,
    ) -> Result<(), CacheError>;

    /// Remember where a design's artifact lives.
    async fn cache_artifact(&self, design_id: DesignId, url: &str) -> Result<(), CacheError>;
}

// =============================================================================
// DynamoDB
// =============================================================================

/// `DynamoDB`-backed request cache.
#[derive(Clone)]
pub struct DynamoRequestCache {
    client: Client,
    tables: DynamoTables,
}

impl DynamoRequestCache {
    /// Build a cache from a loaded AWS SDK configuration.
    #[must_use]
    pub fn new(sdk_config: &aws_config::SdkConfig, tables: DynamoTables) -> Self {
        Self {
            client: Client::new(sdk_config),
            tables,
        }
    }
}

#[async_trait]
impl RequestCache for DynamoRequestCache {
    #[instrument(skip(self, prompt), fields(table = %self.tables.request_table))]
    async fn record_request(
        &self,
        request_id: &str,
        user_id: UserId,
        prompt: &str,
    ) -> Result<(), CacheError> {
        self.client
            .put_item()
            .table_name(&self.tables.request_table)
            .item("request_id", AttributeValue::S(request_id.to_owned()))
            .item("user_id", AttributeValue::N(user_id.to_string()))
            .item("prompt", AttributeValue::S(prompt.to_owned()))
            .item("status", AttributeValue::S("pending".to_owned()))
            .item("created_at", AttributeValue::S(Utc::now().to_rfc3339()))
            .send()
            .await
            .map_err(|e| CacheError::Write(e.to_string()))?;
        Ok(())
    }

    #[instrument(skip(self, url), fields(table = %self.tables.cache_table))]
    async fn cache_artifact(&self, design_id: DesignId, url: &str) -> Result<(), CacheError> {
        self.client
            .put_item()
            .table_name(&self.tables.cache_table)
            .item("design_id", AttributeValue::S(design_id.to_string()))
            .item("image_url", AttributeValue::S(url.to_owned()))
            .item("cached_at", AttributeValue::S(Utc::now().to_rfc3339()))
            .send()
            .await
            .map_err(|e| CacheError::Write(e.to_string()))?;
        Ok(())
    }
}

// =============================================================================
// In-process
// =============================================================================

/// A recorded generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub user_id: UserId,
    pub prompt: String,
}

/// In-process request cache with a 24 hour TTL.
///
/// Used when no `DynamoDB` tables are configured, and in tests.
#[derive(Clone)]
pub struct MemoryRequestCache {
    requests: Cache<String, PendingRequest>,
    artifacts: Cache<DesignId, String>,
}

impl Default for MemoryRequestCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRequestCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests: Cache::builder()
                .max_capacity(MEMORY_CAPACITY)
                .time_to_live(MEMORY_TTL)
                .build(),
            artifacts: Cache::builder()
                .max_capacity(MEMORY_CAPACITY)
                .time_to_live(MEMORY_TTL)
                .build(),
        }
    }

    /// Look up a recorded request.
    pub async fn request(&self, request_id: &str) -> Option<PendingRequest> {
        self.requests.get(request_id).await
    }

    /// Look up a cached artifact URL.
    pub async fn artifact_url(&self, design_id: DesignId) -> Option<String> {
        self.artifacts.get(&design_id).await
    }
}

#[async_trait]
impl RequestCache for MemoryRequestCache {
    async fn record_request(
        &self,
        request_id: &str,
        user_id: UserId,
        prompt: &str,
    ) -> Result<(), CacheError> {
        self.requests
            .insert(
                request_id.to_owned(),
                PendingRequest {
                    user_id,
                    prompt: prompt.to_owned(),
                },
            )
            .await;
        Ok(())
    }

    async fn cache_artifact(&self, design_id: DesignId, url: &str) -> Result<(), CacheError> {
        self.artifacts.insert(design_id, url.to_owned()).await;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cache_records_and_reads_back() {
        let cache = MemoryRequestCache::new();
        cache
            .record_request("req-1", UserId::new(3), "sunset over Fuji")
            .await
            .unwrap();
        cache
            .cache_artifact(DesignId::new(9), "https://cdn.example/designs/3/a.png")
            .await
            .unwrap();

        let pending = cache.request("req-1").await.unwrap();
        assert_eq!(pending.user_id, UserId::new(3));
        assert_eq!(pending.prompt, "sunset over Fuji");
        assert_eq!(
            cache.artifact_url(DesignId::new(9)).await.as_deref(),
            Some("https://cdn.example/designs/3/a.png")
        );
        assert!(cache.artifact_url(DesignId::new(10)).await.is_none());
    }
}
