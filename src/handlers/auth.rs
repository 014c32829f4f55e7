use axum::{extract::State, Json};
use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    models::token::{AccessToken, TokenPair},
    services::auth as auth_service,
    state::AppState,
    validation::auth::{username_rule, validate_payload},
};

/// The request payload for user login.
#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[garde(custom(username_rule))]
    pub username: String,
    #[garde(length(min = 1, max = 128))]
    pub password: String,
}

/// The request payload carrying a refresh token.
#[derive(Deserialize, Validate)]
pub struct RefreshRequest {
    #[garde(length(min = 1, max = 256))]
    pub refresh: String,
}

/// The response payload for logout.
#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
}

/// Handles user login.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenPair>> {
    let payload = validate_payload(payload)?;
    tracing::info!("🔐 Login attempt for: {}", payload.username);

    let pair = auth_service::login(&state, &payload.username, &payload.password).await?;
    Ok(Json(pair))
}

/// Exchanges a refresh token for a new access token.
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AccessToken>> {
    let payload = validate_payload(payload)?;
    let access = auth_service::refresh(&state, &payload.refresh).await?;
    Ok(Json(access))
}

/// Handles user logout by revoking the refresh token.
pub async fn logout(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>> {
    let payload = validate_payload(payload)?;
    auth_service::logout(&state, &payload.refresh).await?;

    Ok(Json(AuthResponse {
        success: true,
        message: "Logged out successfully".to_string(),
    }))
}
