use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The server-side record behind an issued refresh token.
///
/// Only a BLAKE3 fingerprint of the token is used as the lookup key; the
/// raw value never leaves the client after issuance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshGrant {
    /// The ID of the user this grant belongs to.
    pub user_id: Uuid,
    /// The timestamp when the grant was issued.
    pub issued_at: DateTime<Utc>,
    /// The timestamp when the grant expires.
    pub expires_at: DateTime<Utc>,
}

/// The pair returned by a successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// The body returned by a successful refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub access: String,
}
