//! HTTP surface of the search and availability engine.
//!
//! # Routes
//!
//! ```text
//! GET /api/v1/search        search, optionally filtered by availability
//! GET /api/v1/items/:id     single active item
//! GET /health               dependency health (200 / 503)
//! GET /health/live          liveness (always 200)
//! ```
//!
//! # Request Flow
//!
//! 1. **Correlation id** is attached by [`correlation_id_layer`]
//! 2. **Parameters** are validated by the [`SearchQuery`] extractor; a bad
//!    request never reaches the index or the oracle
//! 3. **Handler** calls the search services held in [`AppState`]
//! 4. **Errors** become [`AppError`] JSON bodies

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod state;

pub use error::AppError;
pub use extractors::{CorrelationId, SearchQuery};
pub use middleware::{correlation_id_layer, CORRELATION_ID_HEADER};
pub use state::AppState;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

/// Router with every route, the trace layer and correlation ids.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/search", get(handlers::search))
        .route("/api/v1/items/:id", get(handlers::get_item))
        .route("/health", get(handlers::health))
        .route("/health/live", get(handlers::liveness))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
}
