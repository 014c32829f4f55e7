use reqwest::{Method, StatusCode, header};
use serde::{Serialize, de::DeserializeOwned};

use crate::client::{error::ClientError, gateway::AuthGateway};

/// An authenticated call, kept as data so it can be sent twice.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Attaches a JSON body.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, ClientError> {
        self.body = Some(sonic_rs::to_string(body).map_err(ClientError::decode)?);
        Ok(self)
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }
}

/// A response as received; the status is left for the caller to judge.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Decodes the body as `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        sonic_rs::from_slice(&self.body).map_err(ClientError::decode)
    }

    /// Decodes a 2xx body as `T`; any other status becomes an error.
    pub fn success<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        if !self.status.is_success() {
            return Err(self.error());
        }
        self.decode()
    }

    pub fn error(&self) -> ClientError {
        ClientError::from_response(self.status, &self.body)
    }
}

/// Sends authenticated requests, refreshing the access token once on 401.
#[derive(Clone)]
pub struct RequestPipeline {
    gateway: AuthGateway,
}

impl RequestPipeline {
    pub fn new(gateway: AuthGateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &AuthGateway {
        &self.gateway
    }

    /// Sends `request` with the stored access token.
    ///
    /// On a 401 the token is refreshed and the request re-sent exactly once.
    /// A second 401 yields `Unauthorized`; a refused refresh yields
    /// `ReauthenticationRequired`.
    pub async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse, ClientError> {
        let token = self
            .gateway
            .tokens()
            .access_token()
            .await
            .ok_or(ClientError::NotAuthenticated)?;

        let first = self.send(request, &token).await?;
        if first.status != StatusCode::UNAUTHORIZED {
            return Ok(first);
        }

        tracing::debug!("🔐 {} {} answered 401, refreshing", request.method, request.path);

        // Another request may already have refreshed while this one was in flight.
        let fresh = match self.gateway.tokens().access_token().await {
            Some(current) if current != token => current,
            _ => self.gateway.refresh().await?,
        };

        let retried = self.send(request, &fresh).await?;
        if retried.status == StatusCode::UNAUTHORIZED {
            tracing::warn!("❌ {} {} still unauthorized after refresh", request.method, request.path);
            return Err(ClientError::Unauthorized);
        }

        Ok(retried)
    }

    async fn send(&self, request: &ApiRequest, token: &str) -> Result<ApiResponse, ClientError> {
        let mut builder = self
            .gateway
            .http()
            .request(request.method.clone(), self.gateway.url(&request.path))
            .bearer_auth(token)
            .header(header::ACCEPT, "application/json");

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        if let Some(body) = &request.body {
            builder = builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();

        Ok(ApiResponse { status, body })
    }
}
