//! Stripe payment intent client.
//!
//! Only the three calls checkout needs: create an intent for the cart total,
//! retrieve an intent to verify it, and (test mode only) create an intent
//! that is confirmed immediately with a test card.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

use tee_studio_core::{Amount, Currency, PaymentIntentStatus, UserId};

use crate::config::StripeConfig;

/// Stripe's test card payment method.
const TEST_PAYMENT_METHOD: &str = "pm_card_visa";

/// Metadata key carrying the paying user's id.
const USER_ID_METADATA_KEY: &str = "user_id";

/// Errors that can occur when talking to the payment processor.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The request did not complete within the configured timeout.
    #[error("payment processor timed out")]
    Timeout,

    /// Connection-level failure.
    #[error("payment processor unavailable: {0}")]
    Unavailable(String),

    /// The processor answered with an error status.
    #[error("payment processor error: {status} - {message}")]
    Api { status: u16, message: String },

    /// No intent with this id exists.
    #[error("payment intent not found: {0}")]
    NotFound(String),

    /// The test flow was requested with a live-mode key.
    #[error("test payments require a test-mode key")]
    TestModeRequired,

    /// Failed to parse the response.
    #[error("parse error: {0}")]
    Parse(String),
}

impl PaymentError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Unavailable(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::NotFound(_) | Self::TestModeRequired | Self::Parse(_) => false,
        }
    }

    fn from_transport(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Unavailable(e.to_string())
        }
    }
}

/// A payment intent as the processor reports it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    /// Handed to the browser to complete payment. Absent on some test intents.
    #[serde(default)]
    pub client_secret: Option<String>,
    pub amount: Amount,
    pub currency: Currency,
    pub status: PaymentIntentStatus,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PaymentIntent {
    /// The user recorded in the intent's metadata, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.metadata.get(USER_ID_METADATA_KEY)?.parse().ok()
    }
}

/// Parameters for a new payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateIntent {
    pub amount: Amount,
    pub currency: Currency,
    pub user_id: UserId,
}

/// Hosted payment-intent API.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create an intent the browser completes with the returned client secret.
    async fn create_intent(&self, request: &CreateIntent) -> Result<PaymentIntent, PaymentError>;

    /// Fetch an intent's current state.
    async fn retrieve(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError>;

    /// Create an intent that is confirmed immediately with a test card.
    ///
    /// Fails with [`PaymentError::TestModeRequired`] outside test mode.
    async fn create_confirmed_test_intent(
        &self,
        request: &CreateIntent,
    ) -> Result<PaymentIntent, PaymentError>;

    /// Whether the gateway is running against the processor's test mode.
    fn is_test_mode(&self) -> bool;

    /// Current status of an intent.
    async fn get_status(&self, intent_id: &str) -> Result<PaymentIntentStatus, PaymentError> {
        Ok(self.retrieve(intent_id).await?.status)
    }
}

// =============================================================================
// Stripe
// =============================================================================

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    secret_key: SecretString,
    api_base: String,
    test_mode: bool,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: String,
}

impl StripeClient {
    /// Create a new Stripe client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &StripeConfig, timeout: Duration) -> Result<Self, PaymentError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            secret_key: config.secret_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_owned(),
            test_mode: config.is_test_mode(),
        })
    }

    fn intents_url(&self) -> String {
        format!("{}/v1/payment_intents", self.api_base)
    }

    async fn post_intent(&self, form: &[(&str, String)]) -> Result<PaymentIntent, PaymentError> {
        let response = self
            .client
            .post(self.intents_url())
            .bearer_auth(self.secret_key.expose_secret())
            .form(form)
            .send()
            .await
            .map_err(|e| PaymentError::from_transport(&e))?;

        Self::parse_intent(response).await
    }

    async fn parse_intent(response: reqwest::Response) -> Result<PaymentIntent, PaymentError> {
        let status = response.status();

        if !status.is_success() {
            let message = response
                .json::<StripeErrorBody>()
                .await
                .map(|body| body.error.message)
                .unwrap_or_default();
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| PaymentError::Parse(e.to_string()))
    }

    fn base_form(request: &CreateIntent) -> Vec<(&'static str, String)> {
        vec![
            ("amount", request.amount.minor().to_string()),
            ("currency", request.currency.code().to_owned()),
            ("metadata[user_id]", request.user_id.to_string()),
        ]
    }
}

/// Stripe ids are ASCII alphanumerics and underscores.
fn is_valid_intent_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[async_trait]
impl PaymentGateway for StripeClient {
    #[instrument(skip(self), fields(amount = request.amount.minor(), currency = %request.currency))]
    async fn create_intent(&self, request: &CreateIntent) -> Result<PaymentIntent, PaymentError> {
        let mut form = Self::base_form(request);
        form.push(("automatic_payment_methods[enabled]", "true".to_owned()));
        self.post_intent(&form).await
    }

    #[instrument(skip(self))]
    async fn retrieve(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError> {
        if !is_valid_intent_id(intent_id) {
            return Err(PaymentError::NotFound(intent_id.to_owned()));
        }

        let response = self
            .client
            .get(format!("{}/{intent_id}", self.intents_url()))
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await
            .map_err(|e| PaymentError::from_transport(&e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(PaymentError::NotFound(intent_id.to_owned()));
        }

        Self::parse_intent(response).await
    }

    #[instrument(skip(self), fields(amount = request.amount.minor()))]
    async fn create_confirmed_test_intent(
        &self,
        request: &CreateIntent,
    ) -> Result<PaymentIntent, PaymentError> {
        if !self.test_mode {
            return Err(PaymentError::TestModeRequired);
        }

        let mut form = Self::base_form(request);
        form.push(("payment_method", TEST_PAYMENT_METHOD.to_owned()));
        form.push(("payment_method_types[]", "card".to_owned()));
        form.push(("confirm", "true".to_owned()));
        self.post_intent(&form).await
    }

    fn is_test_mode(&self) -> bool {
        self.test_mode
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_deserializes_from_stripe_json() {
        let json = r#"{
            "id": "pi_3Nabc",
            "object": "payment_intent",
            "amount": 6000,
            "currency": "jpy",
            "status": "succeeded",
            "client_secret": "pi_3Nabc_secret_xyz",
            "metadata": {"user_id": "42"}
        }"#;
        let intent: PaymentIntent = serde_json::from_str(json).unwrap();
        assert_eq!(intent.amount, Amount::from_minor(6000));
        assert_eq!(intent.currency, Currency::Jpy);
        assert!(intent.status.is_succeeded());
        assert_eq!(intent.user_id(), Some(UserId::new(42)));
    }

    #[test]
    fn test_intent_without_metadata_has_no_user() {
        let json = r#"{"id":"pi_1","amount":100,"currency":"jpy","status":"requires_payment_method"}"#;
        let intent: PaymentIntent = serde_json::from_str(json).unwrap();
        assert_eq!(intent.user_id(), None);
        assert_eq!(intent.client_secret, None);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(PaymentError::Timeout.is_retryable());
        assert!(
            PaymentError::Api {
                status: 503,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(
            PaymentError::Api {
                status: 429,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(
            !PaymentError::Api {
                status: 402,
                message: "card declined".to_string()
            }
            .is_retryable()
        );
        assert!(!PaymentError::NotFound("pi_x".to_string()).is_retryable());
    }

    #[test]
    fn test_intent_id_validation() {
        assert!(is_valid_intent_id("pi_3NabcXYZ"));
        assert!(!is_valid_intent_id(""));
        assert!(!is_valid_intent_id("pi_1/../../customers"));
    }
}
