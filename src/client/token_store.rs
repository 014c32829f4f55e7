use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{client::error::ClientError, crypto::jwt::Claims, models::user::Role};

/// Who the stored access token speaks for, read from its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject_id: Uuid,
    pub role: Role,
    pub username: String,
    pub display_name: String,
}

impl Identity {
    /// Reads the identity out of a JWT payload without checking the
    /// signature; the server remains the only verifier.
    pub fn from_access_token(token: &str) -> Result<Self, ClientError> {
        let payload = token
            .split('.')
            .nth(1)
            .ok_or_else(|| ClientError::Decode("Malformed access token".to_string()))?;
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(ClientError::decode)?;
        let claims: Claims = sonic_rs::from_slice(&bytes).map_err(ClientError::decode)?;

        Ok(Identity {
            subject_id: claims.sub,
            role: claims.role,
            username: claims.username,
            display_name: claims.name,
        })
    }
}

/// Everything the client holds for a logged-in user.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub identity: Identity,
}

/// Process-local handle on the current `AuthSession`. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    session: Arc<RwLock<Option<AuthSession>>>,
}

impl TokenStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session(&self) -> Option<AuthSession> {
        self.session.read().await.clone()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.session.read().await.as_ref().map(|s| s.access_token.clone())
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.session.read().await.as_ref().map(|s| s.refresh_token.clone())
    }

    pub async fn identity(&self) -> Option<Identity> {
        self.session.read().await.as_ref().map(|s| s.identity.clone())
    }

    pub async fn set(&self, session: AuthSession) {
        *self.session.write().await = Some(session);
    }

    /// Swaps in a refreshed access token, but only if the session it was
    /// refreshed for is still the stored one.
    pub async fn replace_access(&self, refresh_token: &str, access_token: String, identity: Identity) -> bool {
        let mut guard = self.session.write().await;
        match guard.as_mut() {
            Some(session) if session.refresh_token == refresh_token => {
                session.access_token = access_token;
                session.identity = identity;
                true
            }
            _ => false,
        }
    }

    pub async fn clear(&self) {
        *self.session.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::jwt::issue_access_token;
    use crate::models::user::User;
    use chrono::Utc;

    fn identity() -> Identity {
        Identity {
            subject_id: Uuid::new_v4(),
            role: Role::Teacher,
            username: "mreyes".to_string(),
            display_name: "Maria Reyes".to_string(),
        }
    }

    #[test]
    fn identity_is_read_from_token_payload() {
        let user = User {
            id: Uuid::new_v4(),
            username: "asantos".to_string(),
            display_name: "Ana Santos".to_string(),
            password: String::new(),
            role: Role::Student,
            is_active: true,
            created_at: Utc::now(),
        };
        let token = issue_access_token(&user, Utc::now(), 300, &[3u8; 32]).unwrap();

        let identity = Identity::from_access_token(&token).unwrap();
        assert_eq!(identity.subject_id, user.id);
        assert_eq!(identity.role, Role::Student);
        assert_eq!(identity.display_name, "Ana Santos");
    }

    #[test]
    fn garbage_token_is_a_decode_error() {
        assert!(matches!(
            Identity::from_access_token("not-a-jwt"),
            Err(ClientError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn refreshed_token_does_not_revive_a_cleared_session() {
        let store = TokenStore::new();
        store
            .set(AuthSession {
                access_token: "a1".to_string(),
                refresh_token: "r1".to_string(),
                identity: identity(),
            })
            .await;

        assert!(store.replace_access("r1", "a2".to_string(), identity()).await);
        assert_eq!(store.access_token().await.as_deref(), Some("a2"));

        store.clear().await;
        assert!(!store.replace_access("r1", "a3".to_string(), identity()).await);
        assert!(store.session().await.is_none());
    }
}
