//! HTTP availability oracle.

use crate::credentials::{ClientCredentials, CredentialCache};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use staysearch_core::availability::{AvailabilityOracle, AvailabilityQuery, OracleError, OracleQuote};
use staysearch_core::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Deserialize)]
struct Envelope {
    data: OracleQuote,
}

/// [`AvailabilityOracle`] speaking the oracle's REST API.
///
/// Lookups go to `GET {base}/v3/availability/{id}?checkin=&checkout=&guests=`
/// with a bearer token from the shared [`CredentialCache`]. A `401` drops the
/// cached token so the next lookup re-authenticates.
#[derive(Debug, Clone)]
pub struct HttpAvailabilityOracle {
    http: Client,
    base_url: String,
    credentials: Arc<CredentialCache>,
}

impl HttpAvailabilityOracle {
    /// Create a client for `base_url`. `timeout` bounds each HTTP exchange,
    /// token requests included.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Transport`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        credentials: ClientCredentials,
        timeout: Duration,
    ) -> Result<Self, OracleError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        Ok(Self {
            credentials: Arc::new(CredentialCache::new(http.clone(), credentials)),
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Replace the credential cache (tests use a short refresh margin).
    #[must_use]
    pub fn with_credential_cache(mut self, cache: CredentialCache) -> Self {
        self.credentials = Arc::new(cache);
        self
    }

    async fn fetch_quote(&self, query: AvailabilityQuery) -> Result<OracleQuote, OracleError> {
        let token = self.credentials.bearer().await?;
        let url = format!("{}/v3/availability/{}", self.base_url, query.item_id);

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(&[
                ("checkin", query.stay.check_in().to_string()),
                ("checkout", query.stay.check_out().to_string()),
                ("guests", query.guests.to_string()),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::OK => {
                let envelope: Envelope = response
                    .json()
                    .await
                    .map_err(|e| OracleError::Malformed(e.to_string()))?;
                Ok(envelope.data)
            }
            StatusCode::UNAUTHORIZED => {
                self.credentials.invalidate().await;
                let body = response.text().await.unwrap_or_default();
                Err(OracleError::Unauthorized(truncate(body)))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(OracleError::Status {
                    status: status.as_u16(),
                    body: truncate(body),
                })
            }
        }
    }
}

impl AvailabilityOracle for HttpAvailabilityOracle {
    fn quote(&self, query: &AvailabilityQuery) -> BoxFuture<'_, Result<OracleQuote, OracleError>> {
        let query = query.clone();
        Box::pin(async move { self.fetch_quote(query).await })
    }

    fn ensure_ready(&self) -> BoxFuture<'_, Result<(), OracleError>> {
        Box::pin(async move { self.credentials.bearer().await.map(|_| ()) })
    }
}

fn transport_error(err: reqwest::Error) -> OracleError {
    if err.is_timeout() {
        OracleError::Timeout
    } else {
        OracleError::Transport(err.to_string())
    }
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_error_bodies_are_truncated_on_char_boundary() {
        let body = "é".repeat(400);
        let cut = truncate(body);
        assert!(cut.len() <= MAX_ERROR_BODY);
        assert!(cut.chars().all(|c| c == 'é'));
    }

    #[test]
    fn trailing_slash_is_trimmed_from_base_url() {
        let oracle = HttpAvailabilityOracle::new(
            "http://oracle.local/",
            ClientCredentials {
                token_url: "http://oracle.local/token".to_string(),
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
            },
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(oracle.base_url, "http://oracle.local");
    }
}
