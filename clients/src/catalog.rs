//! HTTP catalog lookup.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use staysearch_core::catalog::{CatalogClient, CatalogError, CatalogSnapshot};
use staysearch_core::item::ItemId;
use staysearch_core::BoxFuture;
use std::time::Duration;

/// The catalog answers either `{"data": {...}}` or the bare record.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Body {
    Wrapped { data: CatalogSnapshot },
    Bare(CatalogSnapshot),
}

impl Body {
    fn into_snapshot(self) -> CatalogSnapshot {
        match self {
            Self::Wrapped { data } => data,
            Self::Bare(snapshot) => snapshot,
        }
    }
}

/// [`CatalogClient`] for `GET {base}/api/v1/hotels/{id}`.
#[derive(Debug, Clone)]
pub struct HttpCatalogClient {
    http: Client,
    base_url: String,
}

impl HttpCatalogClient {
    /// Create a client for `base_url` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Transport`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CatalogError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

impl CatalogClient for HttpCatalogClient {
    fn fetch(&self, id: &ItemId) -> BoxFuture<'_, Result<CatalogSnapshot, CatalogError>> {
        let id = id.clone();
        Box::pin(async move {
            let url = format!("{}/api/v1/hotels/{id}", self.base_url);
            let response = self
                .http
                .get(url)
                .send()
                .await
                .map_err(|e| CatalogError::Transport(e.to_string()))?;

            match response.status() {
                StatusCode::OK => {
                    let body: Body = response
                        .json()
                        .await
                        .map_err(|e| CatalogError::Malformed(e.to_string()))?;
                    tracing::debug!(item_id = %id, "Fetched catalog record");
                    Ok(body.into_snapshot())
                }
                StatusCode::NOT_FOUND => Err(CatalogError::NotFound(id)),
                status => Err(CatalogError::Status {
                    status: status.as_u16(),
                    body: response.text().await.unwrap_or_default(),
                }),
            }
        })
    }
}
