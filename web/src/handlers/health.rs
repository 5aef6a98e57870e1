//! Health endpoints for load balancers and monitoring.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use staysearch_search::HealthReport;

/// Liveness: the process is serving requests. Never touches dependencies.
///
/// ```text
/// GET /health/live
/// ```
#[allow(clippy::unused_async)]
pub async fn liveness() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Dependency health.
///
/// # Status Codes
///
/// - 200 OK: every dependency is up
/// - 503 Service Unavailable: at least one is down
///
/// ```text
/// GET /health
/// ```
///
/// ```json
/// {
///   "status": "down",
///   "dependencies": {
///     "index_store": "up",
///     "event_transport": "down",
///     "availability_oracle": "up"
///   },
///   "dead_letters": { "count": 0, "recent": [] }
/// }
/// ```
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.health.check().await;

    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn liveness_is_always_ok() {
        let (status, body) = liveness().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }
}
