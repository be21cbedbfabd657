//! Authentication route handlers.
//!
//! Signup and login return a bearer token; every other authenticated route
//! reads it through [`RequireAuth`].

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use tracing::instrument;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::User;
use crate::routes::ApiJson;
use crate::services::auth::AuthSession;
use crate::state::AppState;

/// Signup and login body.
#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for CredentialsRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsRequest")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Create an account.
#[instrument(skip_all)]
pub async fn signup(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CredentialsRequest>,
) -> Result<(StatusCode, Json<AuthSession>)> {
    let session = state.auth().signup(&body.email, &body.password).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// Exchange credentials for a token.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CredentialsRequest>,
) -> Result<Json<AuthSession>> {
    let session = state.auth().login(&body.email, &body.password).await?;
    Ok(Json(session))
}

/// The authenticated user.
pub async fn me(
    State(state): State<AppState>,
    RequireAuth(user_id): RequireAuth,
) -> Result<Json<User>> {
    Ok(Json(state.auth().get_user(user_id).await?))
}
