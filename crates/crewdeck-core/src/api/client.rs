//! Client for the backend's authentication endpoints.
//!
//! `AuthClient` is the seam the session manager talks to. Each call is a
//! single request/response: no retries, no caching and no state of its own.
//! `HttpAuthClient` is the reqwest-backed implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::models::{RoleSet, Session, User};

use super::error::{AuthError, Endpoint};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

const LOGIN_PATH: &str = "/auth/login";
const VERIFY_PATH: &str = "/auth/me";
const REFRESH_PATH: &str = "/auth/refresh";
const ROLES_PATH: &str = "/auth/user-roles";

/// Remote operations the session manager depends on.
#[async_trait]
pub trait AuthClient: Send + Sync {
    /// Exchange credentials for a session and the identity it belongs to.
    async fn login(&self, email: &str, password: &str) -> Result<(Session, User), AuthError>;

    /// Check an access token and return the identity it belongs to.
    async fn verify(&self, access_token: &str) -> Result<User, AuthError>;

    /// Mint a new token pair from a refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<Session, AuthError>;

    /// Load the caller's authorization roles.
    async fn fetch_roles(&self, access_token: &str) -> Result<RoleSet, AuthError>;
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    user: User,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RolesResponse {
    #[serde(default)]
    roles: RoleSet,
}

impl From<RefreshResponse> for Session {
    fn from(r: RefreshResponse) -> Self {
        Session::new(r.access_token, r.refresh_token, r.expires_in)
    }
}

/// Auth client backed by the REST API.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpAuthClient {
    client: Client,
    base_url: String,
}

impl HttpAuthClient {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Build on an existing client, sharing its connection pool.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check if response is successful, classifying the status if not.
    async fn check_response(
        endpoint: Endpoint,
        response: Response,
    ) -> Result<Response, AuthError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            debug!(?endpoint, %status, "Auth request rejected");
            Err(AuthError::from_status(endpoint, status, &body))
        }
    }

    async fn parse<T: DeserializeOwned>(
        endpoint: Endpoint,
        response: Response,
    ) -> Result<T, AuthError> {
        let response = Self::check_response(endpoint, response).await?;
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| AuthError::InvalidResponse(format!("{:?} response: {}", endpoint, e)))
    }
}

#[async_trait]
impl AuthClient for HttpAuthClient {
    async fn login(&self, email: &str, password: &str) -> Result<(Session, User), AuthError> {
        let response = self
            .client
            .post(self.url(LOGIN_PATH))
            .json(&LoginRequest { email, password })
            .send()
            .await?;

        let login: LoginResponse = Self::parse(Endpoint::Login, response).await?;
        let session = Session::new(login.access_token, login.refresh_token, login.expires_in);
        Ok((session, login.user))
    }

    async fn verify(&self, access_token: &str) -> Result<User, AuthError> {
        let response = self
            .client
            .get(self.url(VERIFY_PATH))
            .bearer_auth(access_token)
            .send()
            .await?;

        Self::parse(Endpoint::Verify, response).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let response = self
            .client
            .post(self.url(REFRESH_PATH))
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        let refreshed: RefreshResponse = Self::parse(Endpoint::Refresh, response).await?;
        Ok(refreshed.into())
    }

    async fn fetch_roles(&self, access_token: &str) -> Result<RoleSet, AuthError> {
        let response = self
            .client
            .get(self.url(ROLES_PATH))
            .bearer_auth(access_token)
            .send()
            .await?;

        let roles: RolesResponse = Self::parse(Endpoint::Roles, response).await?;
        Ok(roles.roles)
    }
}
