//! `GET /api/v1/search`.

use crate::{
    error::AppError,
    extractors::{CorrelationId, SearchQuery},
    state::AppState,
};
use axum::{extract::State, Json};
use staysearch_search::SearchResponse;

/// Search the index, filtered by availability when dates are given.
///
/// Returns 200 even when availability checks failed; the body then carries
/// `degraded: true` and a notice. Only an index outage is an error (503).
#[tracing::instrument(skip_all, fields(correlation_id = %correlation_id.0))]
pub async fn search(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    SearchQuery(request): SearchQuery,
) -> Result<Json<SearchResponse>, AppError> {
    let response = state.aggregator.search(&request).await?;

    tracing::debug!(
        total = response.total,
        page = response.page,
        degraded = response.degraded,
        "Search served"
    );

    Ok(Json(response))
}
