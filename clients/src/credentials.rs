//! OAuth2 client-credentials token cache.
//!
//! The oracle authenticates every lookup with a bearer token obtained from a
//! token endpoint. The token is fetched lazily, shared by all concurrent
//! lookups and refreshed a fixed margin before it expires.
//!
//! The cached token sits behind a `tokio::sync::Mutex` so that only one
//! refresh is in flight: callers that arrive during a refresh wait for it and
//! reuse its token instead of hitting the endpoint again.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use staysearch_core::availability::OracleError;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default margin before expiry at which a token is refreshed.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Client id and secret for the token endpoint.
#[derive(Clone)]
pub struct ClientCredentials {
    /// Full URL of the token endpoint
    pub token_url: String,
    /// OAuth2 client id
    pub client_id: String,
    /// OAuth2 client secret
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Lock-protected bearer token with refresh-before-expiry.
#[derive(Debug)]
pub struct CredentialCache {
    http: Client,
    credentials: ClientCredentials,
    refresh_margin: Duration,
    token: Mutex<Option<CachedToken>>,
}

impl CredentialCache {
    /// Create an empty cache. No request is made until the first
    /// [`bearer`](Self::bearer) call.
    #[must_use]
    pub fn new(http: Client, credentials: ClientCredentials) -> Self {
        Self {
            http,
            credentials,
            refresh_margin: DEFAULT_REFRESH_MARGIN,
            token: Mutex::new(None),
        }
    }

    /// Override the refresh margin.
    #[must_use]
    pub const fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Current bearer token, fetching a new one when none is cached or the
    /// cached one expires within the refresh margin.
    ///
    /// # Errors
    ///
    /// - [`OracleError::Unauthorized`] when the endpoint rejects the client
    /// - [`OracleError::CredentialsUnavailable`] when the endpoint is
    ///   unreachable or answers with an unusable body
    pub async fn bearer(&self) -> Result<String, OracleError> {
        let mut slot = self.token.lock().await;

        if let Some(cached) = slot.as_ref() {
            if Instant::now() + self.refresh_margin < cached.expires_at {
                return Ok(cached.access_token.clone());
            }
        }

        let fresh = self.request_token().await?;
        let access_token = fresh.access_token.clone();
        *slot = Some(fresh);
        Ok(access_token)
    }

    /// Drop the cached token so the next call fetches a new one.
    pub async fn invalidate(&self) {
        self.token.lock().await.take();
    }

    async fn request_token(&self) -> Result<CachedToken, OracleError> {
        tracing::debug!(token_url = %self.credentials.token_url, "Requesting oracle access token");

        let response = self
            .http
            .post(&self.credentials.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| OracleError::CredentialsUnavailable(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let body: TokenResponse = response
                    .json()
                    .await
                    .map_err(|e| OracleError::CredentialsUnavailable(format!("token body: {e}")))?;

                tracing::info!(expires_in = body.expires_in, "Obtained oracle access token");

                Ok(CachedToken {
                    access_token: body.access_token,
                    expires_at: Instant::now() + Duration::from_secs(body.expires_in),
                })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::BAD_REQUEST => {
                let body = response.text().await.unwrap_or_default();
                tracing::error!(body = %body, "Oracle token endpoint rejected client credentials");
                Err(OracleError::Unauthorized(body))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(OracleError::CredentialsUnavailable(format!(
                    "token endpoint returned {status}: {body}"
                )))
            }
        }
    }
}
