//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//!
//! Every error body is JSON `{"error": "<message>"}`. Persistence and
//! upstream details are logged and captured, never sent to the client.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::clients::{EmailError, GenerationError, PaymentError, TranslationError};
use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::cart::CartError;
use crate::services::checkout::CheckoutError;
use crate::services::designs::DesignError;
use crate::services::orders::OrderError;

/// Application-level error type for the API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Design error: {0}")]
    Design(#[from] DesignError),

    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Mail delivery failed where the caller asked for it directly.
    #[error("Email error: {0}")]
    Email(#[from] EmailError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User is authenticated but not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A dependency is not reachable.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

const INTERNAL_MESSAGE: &str = "Internal server error";

impl AppError {
    /// HTTP status and client-safe message for this error.
    fn classify(&self) -> (StatusCode, String) {
        match self {
            Self::Database(_) | Self::Internal(_) => internal(),
            Self::Auth(err) => classify_auth(err),
            Self::Design(err) => classify_design(err),
            Self::Cart(err) => classify_cart(err),
            Self::Checkout(err) => classify_checkout(err),
            Self::Order(err) => classify_order(err),
            Self::Email(err) => match err {
                EmailError::Smtp(_) | EmailError::Rejected(_) => upstream(false, "Mail delivery"),
                EmailError::MessageBuild(_)
                | EmailError::InvalidAddress(_)
                | EmailError::Template(_) => internal(),
            },
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
        }
    }
}

fn internal() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        INTERNAL_MESSAGE.to_string(),
    )
}

fn upstream(timed_out: bool, what: &str) -> (StatusCode, String) {
    if timed_out {
        (StatusCode::GATEWAY_TIMEOUT, format!("{what} timed out"))
    } else {
        (StatusCode::BAD_GATEWAY, format!("{what} failed"))
    }
}

fn classify_auth(err: &AuthError) -> (StatusCode, String) {
    match err {
        AuthError::InvalidEmail(_) => (StatusCode::BAD_REQUEST, "Invalid email address".to_string()),
        AuthError::WeakPassword(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        AuthError::InvalidCredentials | AuthError::UserNotFound => {
            (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string())
        }
        AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, err.to_string()),
        AuthError::UserAlreadyExists => (
            StatusCode::CONFLICT,
            "An account with this email already exists".to_string(),
        ),
        AuthError::TokenSigning(_) | AuthError::Repository(_) | AuthError::PasswordHash => {
            internal()
        }
    }
}

fn classify_design(err: &DesignError) -> (StatusCode, String) {
    match err {
        DesignError::EmptyPrompt | DesignError::PromptTooLong | DesignError::InvalidPlacement(_) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        DesignError::TranslationFailed(e) => {
            upstream(matches!(e, TranslationError::Timeout), "Prompt translation")
        }
        DesignError::GenerationFailed(e) => {
            upstream(matches!(e, GenerationError::Timeout), "Image generation")
        }
        DesignError::StorageFailed(_) => upstream(false, "Image upload"),
        DesignError::NotFound => (StatusCode::NOT_FOUND, err.to_string()),
        DesignError::Forbidden => (StatusCode::FORBIDDEN, err.to_string()),
        DesignError::Repository(_) => internal(),
    }
}

fn classify_cart(err: &CartError) -> (StatusCode, String) {
    match err {
        CartError::Validation(_) | CartError::Overflow => (StatusCode::BAD_REQUEST, err.to_string()),
        CartError::DesignNotFound | CartError::ItemNotFound => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        CartError::Repository(_) => internal(),
    }
}

fn classify_checkout(err: &CheckoutError) -> (StatusCode, String) {
    match err {
        CheckoutError::MissingPaymentIntent
        | CheckoutError::InvalidShippingAddress(_)
        | CheckoutError::PaymentNotConfirmed(_)
        | CheckoutError::Overflow => (StatusCode::BAD_REQUEST, err.to_string()),
        CheckoutError::UserNotFound => (StatusCode::UNAUTHORIZED, err.to_string()),
        CheckoutError::PaymentOwnerMismatch | CheckoutError::TestModeRequired => {
            (StatusCode::FORBIDDEN, err.to_string())
        }
        CheckoutError::EmptyCart
        | CheckoutError::AmountMismatch { .. }
        | CheckoutError::CurrencyMismatch { .. }
        | CheckoutError::CartChanged => (StatusCode::CONFLICT, err.to_string()),
        CheckoutError::Payment(e) => classify_payment(e),
        CheckoutError::UnsupportedCurrency(_) | CheckoutError::Repository(_) => internal(),
    }
}

fn classify_payment(err: &PaymentError) -> (StatusCode, String) {
    match err {
        PaymentError::NotFound(_) => (
            StatusCode::BAD_REQUEST,
            "Payment intent not found".to_string(),
        ),
        PaymentError::TestModeRequired => (StatusCode::FORBIDDEN, err.to_string()),
        PaymentError::Timeout => upstream(true, "Payment processor request"),
        PaymentError::Unavailable(_) | PaymentError::Api { .. } | PaymentError::Parse(_) => {
            upstream(false, "Payment processor request")
        }
    }
}

fn classify_order(err: &OrderError) -> (StatusCode, String) {
    match err {
        OrderError::NotFound => (StatusCode::NOT_FOUND, err.to_string()),
        OrderError::Forbidden => (StatusCode::FORBIDDEN, err.to_string()),
        OrderError::InvalidTransition(_) | OrderError::StatusChanged => {
            (StatusCode::CONFLICT, err.to_string())
        }
        OrderError::TrackingNumberTooLong => (StatusCode::BAD_REQUEST, err.to_string()),
        OrderError::Repository(_) => internal(),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.classify();

        // Capture server and upstream errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                status = status.as_u16(),
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use http_body_util::BodyExt;
    use tee_studio_core::{Amount, Currency, PaymentIntentStatus};

    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("design 12".to_string());
        assert_eq!(err.to_string(), "Not found: design 12");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_taxonomy_status_codes() {
        assert_eq!(
            get_status(DesignError::EmptyPrompt.into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AuthError::InvalidToken.into()),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(DesignError::Forbidden.into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(CartError::ItemNotFound.into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(CheckoutError::EmptyCart.into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(
                CheckoutError::AmountMismatch {
                    charged: Amount::from_minor(1),
                    expected: Amount::from_minor(2),
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(
                CheckoutError::CurrencyMismatch {
                    charged: Currency::Usd,
                    expected: Currency::Jpy,
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(CheckoutError::UnsupportedCurrency(Currency::Usd).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(
                CheckoutError::PaymentNotConfirmed(PaymentIntentStatus::RequiresAction).into()
            ),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(DesignError::GenerationFailed(GenerationError::EmptyOutput).into()),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            get_status(CheckoutError::Payment(PaymentError::Timeout).into()),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            get_status(AppError::Database(RepositoryError::NotFound)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_body_is_json_and_hides_upstream_detail() {
        let err: AppError = CheckoutError::Payment(PaymentError::Api {
            status: 500,
            message: "sk_live_secret leaked in provider message".to_string(),
        })
        .into();

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Payment processor request failed");
    }
}
