use crate::crypto::{jwt, token};
use crate::error::{AppError, Result};
use crate::models::audit::NewAuditEntry;
use crate::models::token::{AccessToken, RefreshGrant, TokenPair};
use crate::models::user::User;
use crate::state::AppState;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, ParamsBuilder,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroize;

/// The memory cost for Argon2 in MB.
const ARGON2_MEMORY_MB: u32 = 19;
/// The number of iterations for Argon2.
const ARGON2_ITERATIONS: u32 = 2;
/// The parallelism factor for Argon2.
const ARGON2_PARALLELISM: u32 = 1;

/// Hashes a password using Argon2id.
///
/// # Arguments
///
/// * `password` - The password to hash.
///
/// # Returns
///
/// A `Result` containing the hashed password.
pub fn hash_password(password: &str) -> Result<String> {
    let mut password_bytes = password.as_bytes().to_vec();

    let mut salt_bytes = [0u8; 16];
    OsRng.try_fill_bytes(&mut salt_bytes)
        .map_err(|e| AppError::Internal(format!("Failed to generate salt: {}", e)))?;

    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::Internal(format!("Salt encoding error: {}", e)))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        ParamsBuilder::new()
            .m_cost(ARGON2_MEMORY_MB * 1024)
            .t_cost(ARGON2_ITERATIONS)
            .p_cost(ARGON2_PARALLELISM)
            .build()
            .map_err(|e| AppError::Internal(format!("Argon2 params: {}", e)))?,
    );

    let password_hash = argon2
        .hash_password(&password_bytes, &salt)
        .map_err(|e| AppError::Internal(format!("Argon2 hash error: {}", e)))?
        .to_string();

    password_bytes.zeroize();
    tracing::debug!("Password hashed successfully with Argon2");
    Ok(password_hash)
}

/// Verifies a password against a hash.
///
/// # Arguments
///
/// * `password` - The password to verify.
/// * `hash` - The hash to verify against.
///
/// # Returns
///
/// A `Result` containing `true` if the password is valid, `false` otherwise.
fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let mut password_bytes = password.as_bytes().to_vec();
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Hash parse error: {}", e)))?;
    let result = Argon2::default()
        .verify_password(&password_bytes, &parsed_hash)
        .is_ok();

    password_bytes.zeroize();
    tracing::debug!("Password verification completed");
    Ok(result)
}

/// Authenticates a user by username and password.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `username` - The user's login name.
/// * `password` - The user's password.
///
/// # Returns
///
/// A `Result` containing the authenticated `User`.
pub async fn authenticate_user(state: &AppState, username: &str, password: &str) -> Result<User> {
    tracing::debug!("🔐 Authenticating user: {}", username);

    let user = state
        .store
        .find_user_by_username(username)
        .await?
        .ok_or_else(|| AppError::Authentication("Invalid username or password".to_string()))?;

    if !verify_password(password, &user.password)? {
        return Err(AppError::Authentication(
            "Invalid username or password".to_string(),
        ));
    }

    tracing::info!("✅ User authenticated: {}", user.id);
    Ok(user)
}

/// Logs a user in, issuing an access token and a refresh token.
pub async fn login(state: &AppState, username: &str, password: &str) -> Result<TokenPair> {
    let user = authenticate_user(state, username, password).await?;
    let now = state.clock.now();

    let access = jwt::issue_access_token(
        &user,
        now,
        state.config.access_token_ttl_secs,
        &state.config.jwt_secret,
    )?;

    let refresh = token::generate_token()?;
    let grant = RefreshGrant {
        user_id: user.id,
        issued_at: now,
        expires_at: now + chrono::Duration::days(state.config.refresh_token_ttl_days),
    };
    state
        .refresh_tokens
        .save(&token::fingerprint(&refresh), &grant, now)
        .await?;

    state
        .store
        .append_audit(NewAuditEntry {
            actor_id: Some(user.id),
            action: "auth.login",
            description: format!("{} logged in", user.username),
            created_at: now,
        })
        .await?;

    tracing::info!("✅ User logged in: {}", user.id);
    Ok(TokenPair { access, refresh })
}

/// Exchanges a refresh token for a new access token. The refresh token
/// itself is not rotated.
pub async fn refresh(state: &AppState, refresh_token: &str) -> Result<AccessToken> {
    let fingerprint = token::fingerprint(refresh_token);
    let now = state.clock.now();

    let grant = state
        .refresh_tokens
        .find(&fingerprint)
        .await?
        .ok_or_else(|| AppError::Authentication("Invalid refresh token".to_string()))?;

    if now > grant.expires_at {
        state.refresh_tokens.revoke(&fingerprint).await?;
        return Err(AppError::Authentication("Refresh token expired".to_string()));
    }

    let user = state
        .store
        .find_user(grant.user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::Authentication("Account is no longer active".to_string()))?;

    let access = jwt::issue_access_token(
        &user,
        now,
        state.config.access_token_ttl_secs,
        &state.config.jwt_secret,
    )?;

    tracing::debug!("🔄 Access token refreshed for user: {}", user.id);
    Ok(AccessToken { access })
}

/// Revokes a refresh token. Unknown tokens are ignored.
pub async fn logout(state: &AppState, refresh_token: &str) -> Result<()> {
    let fingerprint = token::fingerprint(refresh_token);

    if let Some(grant) = state.refresh_tokens.find(&fingerprint).await? {
        state.refresh_tokens.revoke(&fingerprint).await?;
        tracing::info!("👋 Refresh token revoked for user: {}", grant.user_id);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_rejects_other_passwords() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(verify_password("correct horse battery", &hash).unwrap());
        assert!(!verify_password("wrong horse battery", &hash).unwrap());
    }
}
