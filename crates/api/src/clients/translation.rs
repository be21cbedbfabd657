//! Prompt translation client.
//!
//! Users write prompts in Japanese; the generator works best in English.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

use crate::config::TranslationConfig;

/// Errors that can occur when translating text.
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("translation timed out")]
    Timeout,

    #[error("translation unavailable: {0}")]
    Unavailable(String),

    #[error("translation API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The API answered without any translated text.
    #[error("translation returned no text")]
    Empty,
}

impl TranslationError {
    /// Whether retrying the same text may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Unavailable(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Empty => false,
        }
    }
}

/// Translates free text into the generator's language.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str) -> Result<String, TranslationError>;
}

/// `DeepL` REST client.
#[derive(Clone)]
pub struct DeeplClient {
    client: reqwest::Client,
    api_key: SecretString,
    api_url: String,
    target_lang: String,
}

#[derive(Deserialize)]
struct DeeplResponse {
    translations: Vec<DeeplTranslation>,
}

#[derive(Deserialize)]
struct DeeplTranslation {
    text: String,
}

impl DeeplClient {
    /// Create a new `DeepL` client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &TranslationConfig, timeout: Duration) -> Result<Self, TranslationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TranslationError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            api_url: config.api_url.clone(),
            target_lang: config.target_lang.clone(),
        })
    }
}

#[async_trait]
impl Translator for DeeplClient {
    #[instrument(skip(self, text), fields(target = %self.target_lang))]
    async fn translate(&self, text: &str) -> Result<String, TranslationError> {
        let response = self
            .client
            .post(&self.api_url)
            .header(
                AUTHORIZATION,
                format!("DeepL-Auth-Key {}", self.api_key.expose_secret()),
            )
            .form(&[("text", text), ("target_lang", self.target_lang.as_str())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TranslationError::Timeout
                } else {
                    TranslationError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TranslationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: DeeplResponse = response
            .json()
            .await
            .map_err(|e| TranslationError::Unavailable(e.to_string()))?;

        first_translation(body)
    }
}

fn first_translation(body: DeeplResponse) -> Result<String, TranslationError> {
    body.translations
        .into_iter()
        .next()
        .map(|t| t.text)
        .filter(|t| !t.trim().is_empty())
        .ok_or(TranslationError::Empty)
}
