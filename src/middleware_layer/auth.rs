use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    crypto::jwt,
    error::error_body,
    state::AppState,
};

/// Extracts the bearer token from the `Authorization` header.
///
/// # Arguments
///
/// * `request` - The incoming request.
///
/// # Returns
///
/// An `Option` containing the raw token if the header is well formed.
fn extract_bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::CONTENT_TYPE, "application/json")],
        error_body(message, "unauthorized"),
    )
        .into_response()
}

/// A middleware that requires a valid, unexpired access token.
///
/// The verified `Claims` are inserted into the request extensions. Every
/// failure answers 401 so that clients know to refresh.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `request` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// A `Response`.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    tracing::debug!("🔐 Checking authentication...");

    let Some(token) = extract_bearer_token(&request) else {
        tracing::warn!("❌ No bearer token found");
        return unauthorized("Missing access token");
    };

    let claims = match jwt::verify_access_token(token, state.clock.now(), &state.config.jwt_secret) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!("❌ Access token rejected: {}", e);
            return unauthorized("Invalid or expired access token");
        }
    };

    tracing::debug!("✅ User authenticated: {}", claims.sub);

    request.extensions_mut().insert(claims);

    next.run(request).await
}
