//! Query aggregation: index scan, availability fan-out, merge, rank, page.
//!
//! # Flow
//!
//! ```text
//! SearchRequest
//!      │
//!      ▼
//! IndexStore::scan(text, region) ── error ──► SearchError::IndexUnavailable
//!      │
//!      ├── no dates ──► every candidate "not_checked"
//!      │
//!      └── dates ──► DegradationPolicy::assess (once)
//!                        │
//!                        ├── FailFast ──► every candidate unknown, no oracle call
//!                        │
//!                        └── Open ──► FanOut (semaphore + JoinSet, deadline)
//!                                        │ per candidate
//!                                        ▼
//!                                 AvailabilityCache ──► AvailabilityClient
//!      │
//!      ▼
//! classify ──► rank (rating desc, id asc) ──► paginate ──► SearchResponse
//! ```
//!
//! The merge waits for every dispatched lookup (or the deadline), then
//! classifies results in candidate order, so the response never depends on
//! which lookup finished first. Dropping the search future drops the fan-out's
//! `JoinSet`, which aborts any lookup still running.

use crate::cache::AvailabilityCache;
use crate::client::AvailabilityClient;
use crate::model::{
    AvailabilitySummary, ItemAvailability, SearchHit, SearchRequest, SearchResponse, MAX_PAGE_SIZE,
};
use crate::policy::{DegradationPolicy, Inclusion, OracleGate};
use staysearch_core::availability::{
    AvailabilityQuery, AvailabilityResult, Outcome, Source, StayDates, StayError,
};
use staysearch_core::index::{IndexError, IndexStore, ScanFilter};
use staysearch_core::item::IndexedItem;
use staysearch_runtime::metrics::SearchMetrics;
use staysearch_runtime::FanOut;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default number of concurrent availability lookups per search.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 10;

/// Search failures. Oracle trouble is never an error; it degrades the answer.
#[derive(Error, Debug)]
pub enum SearchError {
    /// The index could not be scanned
    #[error("Index unavailable: {0}")]
    IndexUnavailable(#[source] IndexError),

    /// Request parameters are inconsistent
    #[error("Invalid search request: {0}")]
    InvalidRequest(#[from] StayError),
}

/// Aggregator tuning.
#[derive(Debug, Clone, Copy)]
pub struct AggregatorConfig {
    /// Concurrent lookups per search
    pub max_in_flight: usize,
    /// Deadline for the whole fan-out; unresolved lookups become `unknown`
    pub request_timeout: Option<Duration>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            request_timeout: None,
        }
    }
}

impl AggregatorConfig {
    /// Override the per-search concurrency.
    #[must_use]
    pub const fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    /// Bound the fan-out by an overall deadline.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Merges the index with live availability.
pub struct QueryAggregator {
    index: Arc<dyn IndexStore>,
    cache: Arc<AvailabilityCache>,
    client: Arc<AvailabilityClient>,
    policy: DegradationPolicy,
    config: AggregatorConfig,
}

impl QueryAggregator {
    /// Create an aggregator with the default policy and configuration.
    #[must_use]
    pub fn new(
        index: Arc<dyn IndexStore>,
        cache: Arc<AvailabilityCache>,
        client: Arc<AvailabilityClient>,
    ) -> Self {
        Self {
            index,
            cache,
            client,
            policy: DegradationPolicy::new(),
            config: AggregatorConfig::default(),
        }
    }

    /// Replace the degradation policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: DegradationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the configuration.
    #[must_use]
    pub const fn with_config(mut self, config: AggregatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Run a search.
    ///
    /// # Errors
    ///
    /// - [`SearchError::IndexUnavailable`] if the index scan fails
    /// - [`SearchError::InvalidRequest`] if a date-ranged search has zero guests
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let started = Instant::now();
        let result = self.run(request).await;

        let label = match &result {
            Ok(response) if response.degraded => {
                SearchMetrics::record_degraded();
                "degraded"
            }
            Ok(_) => "ok",
            Err(SearchError::IndexUnavailable(_)) => "index_unavailable",
            Err(SearchError::InvalidRequest(_)) => "invalid",
        };
        SearchMetrics::record_request(label, started.elapsed());

        result
    }

    async fn run(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let mut filter = ScanFilter::all();
        if let Some(text) = &request.text {
            filter = filter.text(text);
        }
        if let Some(region) = &request.region {
            filter = filter.region(region);
        }

        let candidates = self.index.scan(&filter).await.map_err(|e| {
            tracing::error!(error = %e, "Index scan failed");
            SearchError::IndexUnavailable(e)
        })?;

        let merged = match request.stay {
            None => Merged::unchecked(candidates),
            Some(stay) => self.check_availability(candidates, stay, request.guests).await?,
        };

        Ok(merged.into_response(request))
    }

    async fn check_availability(
        &self,
        candidates: Vec<IndexedItem>,
        stay: StayDates,
        guests: u32,
    ) -> Result<Merged, SearchError> {
        let queries = candidates
            .iter()
            .map(|item| AvailabilityQuery::new(item.id.clone(), stay, guests))
            .collect::<Result<Vec<_>, _>>()?;

        let mut notices = Vec::new();
        let results = if queries.is_empty() {
            Vec::new()
        } else {
            match self.policy.assess(&self.client).await {
                OracleGate::Open => self.fan_out(queries).await,
                OracleGate::FailFast { reason } => {
                    notices.push(format!("Availability checks skipped: {reason}"));
                    let source = self.client.source();
                    queries
                        .into_iter()
                        .map(|query| AvailabilityResult::unknown(query, source))
                        .collect()
                }
            }
        };

        let mut merged = Merged {
            hits: Vec::new(),
            summary: AvailabilitySummary {
                checked: true,
                ..AvailabilitySummary::default()
            },
            notices,
        };

        for (item, result) in candidates.into_iter().zip(results) {
            match result.outcome {
                Outcome::Available if result.source == Source::Simulated => merged.summary.simulated += 1,
                Outcome::Available => merged.summary.confirmed += 1,
                Outcome::Unavailable => merged.summary.unavailable += 1,
                Outcome::Unknown => merged.summary.unknown += 1,
            }

            match self.policy.classify(&result) {
                Inclusion::Include(confidence) => merged.hits.push(SearchHit {
                    item,
                    availability: ItemAvailability {
                        status: confidence.into(),
                        price: result.price,
                        currency: result.currency,
                        source: Some(result.source),
                    },
                }),
                Inclusion::Exclude(reason) => {
                    tracing::trace!(item_id = %item.id, ?reason, "Excluding item from date-ranged search");
                }
            }
        }

        if merged.summary.unknown > 0 {
            merged.notices.push(format!(
                "Availability could not be confirmed for {} item(s); they are not shown",
                merged.summary.unknown
            ));
        }
        if merged.summary.simulated > 0 {
            merged.notices.push(if self.policy.allows_simulated() {
                "Some availability is simulated and unconfirmed".to_string()
            } else {
                format!(
                    "{} item(s) had only simulated availability and are not shown",
                    merged.summary.simulated
                )
            });
        }

        Ok(merged)
    }

    async fn fan_out(&self, queries: Vec<AvailabilityQuery>) -> Vec<AvailabilityResult> {
        let fan_out = FanOut::new(self.config.max_in_flight).with_deadline(self.config.request_timeout);

        let answers = fan_out
            .run(queries.clone(), |query| {
                let cache = Arc::clone(&self.cache);
                let client = Arc::clone(&self.client);
                async move { cache.get_or_compute(&query, || client.check(&query)).await }
            })
            .await;

        let source = self.client.source();
        queries
            .into_iter()
            .zip(answers)
            .map(|(query, answer)| answer.unwrap_or_else(|| AvailabilityResult::unknown(query, source)))
            .collect()
    }
}

struct Merged {
    hits: Vec<SearchHit>,
    summary: AvailabilitySummary,
    notices: Vec<String>,
}

impl Merged {
    fn unchecked(candidates: Vec<IndexedItem>) -> Self {
        Self {
            hits: candidates
                .into_iter()
                .map(|item| SearchHit {
                    item,
                    availability: ItemAvailability::not_checked(),
                })
                .collect(),
            summary: AvailabilitySummary::default(),
            notices: Vec::new(),
        }
    }

    fn into_response(mut self, request: &SearchRequest) -> SearchResponse {
        self.hits.sort_by(|a, b| rank(&a.item, &b.item));

        let page = request.page.max(1);
        let page_size = request.page_size.clamp(1, MAX_PAGE_SIZE);
        let total = self.hits.len();
        let total_pages = u32::try_from(total.div_ceil(page_size as usize)).unwrap_or(u32::MAX);

        let offset = (page as usize - 1).saturating_mul(page_size as usize);
        let items = self
            .hits
            .into_iter()
            .skip(offset)
            .take(page_size as usize)
            .collect();

        SearchResponse {
            items,
            total,
            page,
            page_size,
            total_pages,
            degraded: self.summary.unknown > 0,
            availability: self.summary,
            notices: self.notices,
        }
    }
}

/// Rating descending, then id ascending.
fn rank(a: &IndexedItem, b: &IndexedItem) -> Ordering {
    b.rating.total_cmp(&a.rating).then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryCacheBackend;
    use staysearch_core::index::Version;
    use staysearch_projections::InMemoryIndexStore;
    use staysearch_testing::{fixtures, FailingIndexStore, StubOracle};

    async fn index_with(items: &[(&str, f64)]) -> Arc<InMemoryIndexStore> {
        let index = Arc::new(InMemoryIndexStore::new());
        for (id, rating) in items {
            index
                .upsert(fixtures::item(id, id, "X", *rating), Version::updated(fixtures::at(0)))
                .await
                .unwrap();
        }
        index
    }

    fn aggregator(index: Arc<dyn IndexStore>, oracle: StubOracle) -> QueryAggregator {
        QueryAggregator::new(
            index,
            Arc::new(AvailabilityCache::new(Arc::new(InMemoryCacheBackend::default()))),
            Arc::new(AvailabilityClient::new(Arc::new(oracle))),
        )
    }

    #[tokio::test]
    async fn results_rank_by_rating_then_id() {
        let index = index_with(&[("H3", 4.0), ("H1", 4.0), ("H2", 5.0)]).await;
        let response = aggregator(index, StubOracle::new())
            .search(&SearchRequest::new())
            .await
            .unwrap();

        let ids: Vec<_> = response.items.iter().map(|h| h.item.id.to_string()).collect();
        assert_eq!(ids, ["H2", "H1", "H3"]);
    }

    #[tokio::test]
    async fn pagination_reports_totals() {
        let index = index_with(&[("H1", 1.0), ("H2", 2.0), ("H3", 3.0), ("H4", 4.0), ("H5", 5.0)]).await;
        let response = aggregator(index, StubOracle::new())
            .search(&SearchRequest::new().page(3, 2))
            .await
            .unwrap();

        assert_eq!(response.total, 5);
        assert_eq!(response.total_pages, 3);
        assert_eq!(response.items.len(), 1);
        assert_eq!(response.items[0].item.id.as_str(), "H1");
    }

    #[tokio::test]
    async fn page_past_the_end_is_empty() {
        let index = index_with(&[("H1", 1.0)]).await;
        let response = aggregator(index, StubOracle::new())
            .search(&SearchRequest::new().page(9, 20))
            .await
            .unwrap();

        assert!(response.items.is_empty());
        assert_eq!(response.total, 1);
        assert_eq!(response.total_pages, 1);
    }

    #[tokio::test]
    async fn index_failure_is_an_error() {
        let result = aggregator(Arc::new(FailingIndexStore), StubOracle::new())
            .search(&SearchRequest::new())
            .await;

        assert!(matches!(result, Err(SearchError::IndexUnavailable(_))));
    }

    #[tokio::test]
    async fn zero_guests_with_dates_is_invalid() {
        let index = index_with(&[("H1", 1.0)]).await;
        let result = aggregator(index, StubOracle::new())
            .search(
                &SearchRequest::new()
                    .stay(fixtures::stay("2026-06-01", "2026-06-03"))
                    .guests(0),
            )
            .await;

        assert!(matches!(result, Err(SearchError::InvalidRequest(StayError::NoGuests))));
    }

    #[tokio::test]
    async fn empty_candidate_set_skips_the_oracle() {
        let oracle = Arc::new(StubOracle::new());
        let aggregator = QueryAggregator::new(
            Arc::new(InMemoryIndexStore::new()),
            Arc::new(AvailabilityCache::new(Arc::new(InMemoryCacheBackend::default()))),
            Arc::new(AvailabilityClient::new(oracle.clone())),
        );

        let response = aggregator
            .search(&SearchRequest::new().stay(fixtures::stay("2026-06-01", "2026-06-03")))
            .await
            .unwrap();

        assert!(response.items.is_empty());
        assert!(!response.degraded);
        assert!(response.availability.checked);
        assert_eq!(oracle.calls(), 0);
    }

    #[test]
    fn response_serializes_flat_items_with_status() {
        let response = SearchResponse {
            items: vec![SearchHit {
                item: fixtures::item("H1", "Alpha", "X", 4.0),
                availability: ItemAvailability::not_checked(),
            }],
            total: 1,
            page: 1,
            page_size: 20,
            total_pages: 1,
            availability: AvailabilitySummary::default(),
            degraded: false,
            notices: Vec::new(),
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["items"][0]["id"], "H1");
        assert_eq!(json["items"][0]["availability"]["status"], "not_checked");
        assert!(json.get("notices").is_none());
    }
}
