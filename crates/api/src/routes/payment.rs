//! Payment route handlers.
//!
//! The browser completes payment against the processor with the client
//! secret from `create-intent`, then calls `confirm` to place the order.

use axum::{Json, body::Bytes, extract::State};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use tee_studio_core::{OrderId, ShippingAddress};

use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::Order;
use crate::routes::ApiJson;
use crate::services::checkout::{Confirmation, IntentSummary};
use crate::state::AppState;

/// Confirmation body.
#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    #[serde(default)]
    pub payment_intent_id: String,
    pub shipping_address: ShippingAddress,
}

/// Optional test-flow body.
#[derive(Debug, Default, Deserialize)]
pub struct TestFlowRequest {
    pub shipping_address: Option<ShippingAddress>,
}

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub message: &'static str,
    pub order_id: OrderId,
    pub order: Order,
}

impl From<Confirmation> for ConfirmResponse {
    fn from(confirmation: Confirmation) -> Self {
        let message = if confirmation.replayed {
            "Order already confirmed"
        } else {
            "Order placed"
        };
        Self {
            message,
            order_id: confirmation.order.id,
            order: confirmation.order,
        }
    }
}

/// Create a payment intent for the caller's cart total.
#[instrument(skip_all, fields(%user_id))]
pub async fn create_intent(
    State(state): State<AppState>,
    RequireAuth(user_id): RequireAuth,
) -> Result<Json<IntentSummary>> {
    Ok(Json(state.checkout().create_intent(user_id).await?))
}

/// Confirm a succeeded payment and place the order.
#[instrument(skip_all, fields(%user_id))]
pub async fn confirm(
    State(state): State<AppState>,
    RequireAuth(user_id): RequireAuth,
    ApiJson(body): ApiJson<ConfirmRequest>,
) -> Result<Json<ConfirmResponse>> {
    let confirmation = state
        .checkout()
        .confirm_payment(user_id, &body.payment_intent_id, body.shipping_address)
        .await?;

    Ok(Json(confirmation.into()))
}

/// Test-mode checkout: pay with a test card and confirm in one call.
///
/// The body is optional; without one a fixed test address is used.
#[instrument(skip_all, fields(%user_id))]
pub async fn test_flow(
    State(state): State<AppState>,
    RequireAuth(user_id): RequireAuth,
    body: Bytes,
) -> Result<Json<ConfirmResponse>> {
    let request: TestFlowRequest = if body.is_empty() {
        TestFlowRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(e.to_string()))?
    };

    let confirmation = state
        .checkout()
        .test_flow(user_id, request.shipping_address)
        .await?;

    Ok(Json(confirmation.into()))
}
