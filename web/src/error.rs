//! Error responses for web handlers.
//!
//! Every failure leaves the service as `{code, message}` JSON, plus
//! `degraded: true` when the answer reflects a dependency outage.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use staysearch_search::{LookupError, SearchError};
use std::fmt;

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler(Path(id): Path<String>) -> Result<Json<Item>, AppError> {
///     let item = state.lookup.find(&ItemId::new(&id)).await?;
///     item.map(Json).ok_or_else(|| AppError::not_found("Item", id))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    code: &'static str,
    degraded: bool,
    /// Logged on 5xx, never sent to the client
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code,
            degraded: false,
            source: None,
        }
    }

    /// Attach the underlying error.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// 400 for malformed or inconsistent input.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// 404 for a missing resource.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{resource} with id {id} not found"),
        )
    }

    /// 503 when the index cannot be read. Marked degraded.
    #[must_use]
    pub fn index_unavailable() -> Self {
        let mut err = Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "INDEX_UNAVAILABLE",
            "Search index is temporarily unavailable",
        );
        err.degraded = true;
        err
    }

    /// 503 for an upstream that did not answer.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
    }

    /// 502 for an upstream that answered with garbage.
    #[must_use]
    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "BAD_GATEWAY", message)
    }

    /// 500.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            message,
        )
    }

    /// HTTP status of the response.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    degraded: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    error = %source,
                    "Request failed"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    "Request failed"
                ),
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
            degraded: self.degraded,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::IndexUnavailable(_) => Self::index_unavailable().with_source(err),
            SearchError::InvalidRequest(e) => Self::bad_request(e.to_string()),
        }
    }
}

impl From<LookupError> for AppError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::Index(_) => Self::index_unavailable().with_source(err),
            LookupError::Catalog(_) => {
                Self::unavailable("Catalog is temporarily unavailable").with_source(err)
            }
            LookupError::InvalidRecord { .. } => {
                Self::bad_gateway("Catalog returned an invalid record").with_source(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use staysearch_core::availability::StayError;
    use staysearch_core::index::IndexError;

    #[test]
    fn display_includes_code() {
        let err = AppError::bad_request("guests must be positive");
        assert_eq!(err.to_string(), "[BAD_REQUEST] guests must be positive");
    }

    #[test]
    fn not_found_names_the_resource() {
        let err = AppError::not_found("Item", "H1");
        assert_eq!(err.to_string(), "[NOT_FOUND] Item with id H1 not found");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn index_outage_is_a_degraded_503() {
        let err = AppError::from(SearchError::IndexUnavailable(IndexError::Unavailable(
            "down".into(),
        )));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code(), "INDEX_UNAVAILABLE");
        assert!(err.degraded);
    }

    #[test]
    fn invalid_request_is_400() {
        let err = AppError::from(SearchError::InvalidRequest(StayError::NoGuests));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(!err.degraded);
    }
}
