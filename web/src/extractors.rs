//! Custom Axum extractors.
//!
//! - [`CorrelationId`]: the request's correlation id
//! - [`SearchQuery`]: validated search parameters
//!
//! # Examples
//!
//! ```ignore
//! async fn handler(
//!     correlation_id: CorrelationId,
//!     SearchQuery(request): SearchQuery,
//! ) -> Result<Json<SearchResponse>, AppError> {
//!     tracing::info!(correlation_id = %correlation_id.0, "Searching");
//!     Ok(Json(state.aggregator.search(&request).await?))
//! }
//! ```

use crate::error::AppError;
use crate::middleware::CORRELATION_ID_HEADER;
use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use chrono::NaiveDate;
use serde::Deserialize;
use staysearch_core::availability::StayDates;
use staysearch_search::{SearchRequest, model::MAX_PAGE_SIZE};
use uuid::Uuid;

/// Correlation ID for request tracing.
///
/// Taken from the request extensions when the correlation middleware is
/// installed, otherwise from the `X-Correlation-ID` header, otherwise a fresh
/// UUID v4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<Self>() {
            return Ok(*id);
        }

        let correlation_id = parts
            .headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(correlation_id))
    }
}

/// Raw query string of `GET /api/v1/search`.
#[derive(Debug, Default, Deserialize)]
struct SearchParams {
    q: Option<String>,
    #[serde(alias = "city")]
    region: Option<String>,
    checkin: Option<NaiveDate>,
    checkout: Option<NaiveDate>,
    guests: Option<u32>,
    page: Option<u32>,
    page_size: Option<u32>,
}

impl SearchParams {
    fn validate(self) -> Result<SearchRequest, AppError> {
        let mut request = SearchRequest::new();

        if let Some(text) = non_blank(self.q) {
            request = request.text(text);
        }
        if let Some(region) = non_blank(self.region) {
            request = request.region(region);
        }

        match (self.checkin, self.checkout) {
            (Some(check_in), Some(check_out)) => {
                let stay = StayDates::new(check_in, check_out)
                    .map_err(|e| AppError::bad_request(e.to_string()))?;
                request = request.stay(stay);
            }
            (None, None) => {}
            _ => {
                return Err(AppError::bad_request(
                    "checkin and checkout must be given together",
                ));
            }
        }

        let guests = self.guests.unwrap_or(1);
        if guests == 0 {
            return Err(AppError::bad_request("guests must be a positive integer"));
        }

        let page = self.page.unwrap_or(request.page);
        if page == 0 {
            return Err(AppError::bad_request("page must be at least 1"));
        }
        let page_size = self.page_size.unwrap_or(request.page_size);
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(AppError::bad_request(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        Ok(request.guests(guests).page(page, page_size))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Validated search parameters.
///
/// Rejects with a 400 before any downstream call when a parameter does not
/// parse or the combination is inconsistent.
#[derive(Debug, Clone)]
pub struct SearchQuery(pub SearchRequest);

#[async_trait]
impl<S> FromRequestParts<S> for SearchQuery
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(params) = Query::<SearchParams>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError::bad_request(rejection.body_text()))?;

        params.validate().map(Self)
    }
}
