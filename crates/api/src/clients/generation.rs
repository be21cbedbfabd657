//! Text-to-image generation client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::multipart::Form;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::instrument;

use crate::config::StabilityConfig;

/// Errors that can occur when generating an image.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("image generation timed out")]
    Timeout,

    #[error("image generation unavailable: {0}")]
    Unavailable(String),

    /// The API answered with an error status (content filter, bad prompt, quota).
    #[error("image generation API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The API succeeded but returned no image data.
    #[error("image generation produced no output")]
    EmptyOutput,
}

impl GenerationError {
    /// Whether retrying the same prompt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Unavailable(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::EmptyOutput => false,
        }
    }
}

/// Turns a prompt into PNG bytes.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>, GenerationError>;
}

/// Stability AI REST client.
#[derive(Clone)]
pub struct StabilityClient {
    client: reqwest::Client,
    api_key: SecretString,
    api_url: String,
}

impl StabilityClient {
    /// Create a new Stability client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &StabilityConfig, timeout: Duration) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            api_url: config.api_url.clone(),
        })
    }
}

#[async_trait]
impl ImageGenerator for StabilityClient {
    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>, GenerationError> {
        let form = Form::new()
            .text("prompt", prompt.to_owned())
            .text("output_format", "png");

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(self.api_key.expose_secret())
            .header(ACCEPT, "image/*")
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout
                } else {
                    GenerationError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GenerationError::Unavailable(e.to_string()))?;

        if bytes.is_empty() {
            return Err(GenerationError::EmptyOutput);
        }

        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(GenerationError::Timeout.is_retryable());
        assert!(GenerationError::Unavailable("reset".to_string()).is_retryable());
        assert!(
            GenerationError::Api {
                status: 503,
                message: String::new()
            }
            .is_retryable()
        );
        // Content-filter rejections do not change on retry.
        assert!(
            !GenerationError::Api {
                status: 400,
                message: "prompt rejected".to_string()
            }
            .is_retryable()
        );
        assert!(!GenerationError::EmptyOutput.is_retryable());
    }
}
