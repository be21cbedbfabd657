//! Admin route handlers.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use tee_studio_core::{OrderId, OrderStatus};

use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::models::Order;
use crate::routes::{ApiJson, ApiPath};
use crate::state::AppState;

/// Status change body.
#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: OrderStatus,
    pub tracking_number: Option<String>,
}

/// Test email result.
#[derive(Debug, Serialize)]
pub struct TestEmailResponse {
    pub message: &'static str,
    pub recipient: String,
}

/// Send a sample order confirmation to the operator address.
#[instrument(skip_all, fields(admin_id = %admin.id))]
pub async fn send_test_email(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<Json<TestEmailResponse>> {
    let notifications = state.notifications();
    notifications.send_test().await?;

    Ok(Json(TestEmailResponse {
        message: "Test email sent",
        recipient: notifications.admin_email().as_str().to_owned(),
    }))
}

/// Move an order to a new status and notify the operator.
#[instrument(skip_all, fields(admin_id = %admin.id, order_id = %id))]
pub async fn update_order_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<OrderId>,
    ApiJson(body): ApiJson<StatusUpdateRequest>,
) -> Result<Json<Order>> {
    let order = state
        .orders()
        .update_status(id, body.status, body.tracking_number.as_deref())
        .await?;

    Ok(Json(order))
}
