//! Cart route handlers.
//!
//! Responses always carry server-computed prices; clients never send one.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use tracing::instrument;

use tee_studio_core::{CartItemId, DesignId, Placement};

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::CartItem;
use crate::routes::{ApiJson, ApiPath};
use crate::services::cart::{AddToCart, CartView};
use crate::state::AppState;

/// Add-to-cart body.
#[derive(Debug, Deserialize)]
pub struct AddRequest {
    pub design_id: DesignId,
    pub quantity: u32,
    pub size: String,
    pub color: String,
    pub design_config: Option<Placement>,
}

/// Quantity change body.
#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub quantity: u32,
}

/// The caller's priced cart.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user_id): RequireAuth,
) -> Result<Json<CartView>> {
    Ok(Json(state.cart().view(user_id).await?))
}

/// Add a line for one of the caller's designs.
#[instrument(skip_all, fields(%user_id))]
pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user_id): RequireAuth,
    ApiJson(body): ApiJson<AddRequest>,
) -> Result<(StatusCode, Json<CartItem>)> {
    let item = state
        .cart()
        .add(
            user_id,
            AddToCart {
                design_id: body.design_id,
                quantity: body.quantity,
                size: body.size,
                color: body.color,
                design_config: body.design_config,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(item)))
}

/// Change a line's quantity.
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user_id): RequireAuth,
    ApiPath(id): ApiPath<CartItemId>,
    ApiJson(body): ApiJson<UpdateRequest>,
) -> Result<Json<CartItem>> {
    Ok(Json(
        state.cart().update_quantity(user_id, id, body.quantity).await?,
    ))
}

/// Remove a line.
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user_id): RequireAuth,
    ApiPath(id): ApiPath<CartItemId>,
) -> Result<StatusCode> {
    state.cart().remove(user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
