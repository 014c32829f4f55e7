//! HS256 access tokens.
//!
//! Expiry is checked against the caller-supplied server time rather than
//! by `jsonwebtoken` itself, so one clock governs every time decision.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::user::{Role, User};

/// Claims embedded in every access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user ID.
    pub sub: Uuid,
    pub role: Role,
    pub username: String,
    /// Display name.
    pub name: String,
    /// Issued-at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
    /// Unique token ID.
    pub jti: Uuid,
}

/// Issues a signed access token for `user`.
pub fn issue_access_token(
    user: &User,
    now: DateTime<Utc>,
    ttl_secs: i64,
    secret: &[u8],
) -> Result<String> {
    let claims = Claims {
        sub: user.id,
        role: user.role,
        username: user.username.clone(),
        name: user.display_name.clone(),
        iat: now.timestamp(),
        exp: now.timestamp() + ttl_secs,
        jti: Uuid::new_v4(),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| AppError::Token(format!("JWT encode: {}", e)))
}

/// Verifies the signature of `token` and that it has not expired at `now`.
pub fn verify_access_token(token: &str, now: DateTime<Utc>, secret: &[u8]) -> Result<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    let claims = jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map(|data| data.claims)
        .map_err(|e| AppError::Authentication(format!("Invalid access token: {}", e)))?;

    if now.timestamp() >= claims.exp {
        return Err(AppError::Authentication("Access token expired".to_string()));
    }

    Ok(claims)
}
