//! Application state shared by the handlers.

use staysearch_search::{HealthMonitor, ItemLookup, QueryAggregator};
use std::sync::Arc;

/// Services behind the HTTP surface.
#[derive(Clone)]
pub struct AppState {
    /// Search over the index with availability filtering
    pub aggregator: Arc<QueryAggregator>,
    /// Single-item lookup with catalog fallback
    pub lookup: Arc<ItemLookup>,
    /// Dependency probes
    pub health: Arc<HealthMonitor>,
}

impl AppState {
    /// Bundle the services.
    #[must_use]
    pub const fn new(
        aggregator: Arc<QueryAggregator>,
        lookup: Arc<ItemLookup>,
        health: Arc<HealthMonitor>,
    ) -> Self {
        Self {
            aggregator,
            lookup,
            health,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_is_clone() {
        fn assert_clone<T: Clone + Send + Sync + 'static>() {}
        assert_clone::<AppState>();
    }
}
