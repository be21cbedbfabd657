//! Order history route handlers.

use axum::{Json, extract::State};

use tee_studio_core::OrderId;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::Order;
use crate::routes::ApiPath;
use crate::state::AppState;

/// The caller's orders with items, newest first.
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user_id): RequireAuth,
) -> Result<Json<Vec<Order>>> {
    Ok(Json(state.orders().list(user_id).await?))
}

/// One of the caller's orders.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user_id): RequireAuth,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<Order>> {
    Ok(Json(state.orders().get(user_id, id).await?))
}
