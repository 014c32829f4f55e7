use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::{
    client::{
        error::ClientError,
        token_store::{AuthSession, Identity, TokenStore},
    },
    models::token::{AccessToken, TokenPair},
};

type RefreshFuture = Shared<BoxFuture<'static, Result<String, ClientError>>>;

#[derive(Serialize)]
struct LoginBody<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshBody<'a> {
    refresh: &'a str,
}

/// Logs in, refreshes and logs out against the `/api/auth` endpoints,
/// keeping the shared `TokenStore` current.
///
/// Concurrent refreshes are coalesced: the first caller starts the
/// exchange, everyone else awaits the same shared future.
#[derive(Clone)]
pub struct AuthGateway {
    http: Client,
    base_url: Arc<str>,
    tokens: TokenStore,
    in_flight: Arc<Mutex<Option<RefreshFuture>>>,
}

impl AuthGateway {
    /// Creates a gateway for the server at `base_url`, e.g. `http://127.0.0.1:3000`.
    pub fn new(base_url: &str, tokens: TokenStore) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ClientError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            tokens,
            in_flight: Arc::new(Mutex::new(None)),
        })
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Exchanges a username and password for a token pair and stores it.
    pub async fn login(&self, username: &str, password: &str) -> Result<Identity, ClientError> {
        let response = self
            .http
            .post(self.url("/api/auth/login"))
            .json(&LoginBody { username, password })
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            tracing::warn!("❌ Login refused for {}", username);
            return Err(ClientError::InvalidCredentials);
        }

        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(ClientError::from_response(status, &body));
        }

        let pair: TokenPair = sonic_rs::from_slice(&body).map_err(ClientError::decode)?;
        let identity = Identity::from_access_token(&pair.access)?;

        self.tokens
            .set(AuthSession {
                access_token: pair.access,
                refresh_token: pair.refresh,
                identity: identity.clone(),
            })
            .await;

        tracing::info!("✅ Logged in as {} ({})", identity.username, identity.role);
        Ok(identity)
    }

    /// Obtains a new access token with the stored refresh token.
    ///
    /// A refused refresh clears the stored session and yields
    /// `ReauthenticationRequired`. A network failure leaves it in place.
    pub async fn refresh(&self) -> Result<String, ClientError> {
        let exchange = {
            let mut slot = self.in_flight.lock().await;
            match slot.as_ref() {
                Some(pending) => pending.clone(),
                None => {
                    let pending = Self::exchange(self.http.clone(), self.url("/api/auth/refresh"), self.tokens.clone())
                        .boxed()
                        .shared();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };

        let result = exchange.clone().await;

        let mut slot = self.in_flight.lock().await;
        if slot.as_ref().is_some_and(|pending| pending.ptr_eq(&exchange)) {
            *slot = None;
        }

        result
    }

    async fn exchange(http: Client, url: String, tokens: TokenStore) -> Result<String, ClientError> {
        let refresh = tokens.refresh_token().await.ok_or(ClientError::NotAuthenticated)?;
        tracing::debug!("🔄 Refreshing access token");

        let response = http
            .post(url)
            .json(&RefreshBody { refresh: &refresh })
            .send()
            .await?;

        let status = response.status();
        if matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            tracing::warn!("❌ Refresh token refused, clearing session");
            tokens.clear().await;
            return Err(ClientError::ReauthenticationRequired);
        }

        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(ClientError::from_response(status, &body));
        }

        let AccessToken { access } = sonic_rs::from_slice(&body).map_err(ClientError::decode)?;
        let identity = Identity::from_access_token(&access)?;

        if !tokens.replace_access(&refresh, access.clone(), identity).await {
            return Err(ClientError::NotAuthenticated);
        }

        tracing::debug!("✅ Access token refreshed");
        Ok(access)
    }

    /// Revokes the refresh token at the server, then forgets the session.
    /// The revocation is best effort; the local session is always cleared.
    pub async fn logout(&self) {
        if let Some(refresh) = self.tokens.refresh_token().await {
            let revoked = self
                .http
                .post(self.url("/api/auth/logout"))
                .json(&RefreshBody { refresh: &refresh })
                .send()
                .await;

            match revoked {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!("👋 Refresh token revoked");
                }
                Ok(response) => {
                    tracing::warn!("⚠️ Logout answered {}", response.status());
                }
                Err(e) => {
                    tracing::warn!("⚠️ Logout request failed: {}", e);
                }
            }
        }

        self.tokens.clear().await;
    }
}
