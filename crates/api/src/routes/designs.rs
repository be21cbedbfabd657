//! Design route handlers.

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use tee_studio_core::DesignId;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::Design;
use crate::routes::{ApiJson, ApiPath};
use crate::services::designs::GenerateDesign;
use crate::state::AppState;

/// Generation request body. Placement fields default to (0, 0, 1.0).
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: String,
    pub position_x: Option<f64>,
    pub position_y: Option<f64>,
    pub scale: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub message: &'static str,
    pub design: Design,
}

/// Generate a design from a prompt.
#[instrument(skip_all, fields(%user_id))]
pub async fn generate(
    State(state): State<AppState>,
    RequireAuth(user_id): RequireAuth,
    ApiJson(body): ApiJson<GenerateRequest>,
) -> Result<(StatusCode, Json<GenerateResponse>)> {
    let request = GenerateDesign::new(&body.prompt, body.position_x, body.position_y, body.scale)?;
    let design = state.designs().generate(user_id, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(GenerateResponse {
            message: "Design generated",
            design,
        }),
    ))
}

/// The caller's designs, newest first.
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user_id): RequireAuth,
) -> Result<Json<Vec<Design>>> {
    Ok(Json(state.designs().list(user_id).await?))
}

/// One of the caller's designs.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user_id): RequireAuth,
    ApiPath(id): ApiPath<DesignId>,
) -> Result<Json<Design>> {
    Ok(Json(state.designs().get(user_id, id).await?))
}
