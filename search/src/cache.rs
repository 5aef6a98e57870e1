//! Short-TTL availability cache with single-flight.
//!
//! # Flow
//!
//! ```text
//! get_or_compute(query)
//!     │
//!     ├── backend hit ──────────────────────────► result (source = cache)
//!     │
//!     └── miss ──► in-flight cell for the key
//!                      │
//!                      ├── leader: re-check backend, compute, store
//!                      └── followers: await the leader's value
//! ```
//!
//! The backend is an optimization. A failed `get` is a miss and a failed
//! `set` is dropped; both are logged at `warn` and counted, and neither ever
//! reaches the caller.
//!
//! Identical concurrent queries share one `tokio::sync::OnceCell`. If the
//! leader is cancelled mid-computation, the cell stays empty and the next
//! waiter runs the computation instead.

use staysearch_core::availability::{AvailabilityQuery, AvailabilityResult, Outcome, Source};
use staysearch_core::cache::CacheBackend;
use staysearch_runtime::metrics::AvailabilityMetrics;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::OnceCell;

/// Default TTL for available and unavailable results.
pub const DEFAULT_POSITIVE_TTL: Duration = Duration::from_secs(10);

/// Default TTL for unknown and simulated results.
pub const DEFAULT_UNKNOWN_TTL: Duration = Duration::from_secs(2);

/// Cache lifetimes by result kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtl {
    /// Lifetime of trustworthy answers
    pub positive: Duration,
    /// Lifetime of unknown and simulated answers
    pub unknown: Duration,
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self {
            positive: DEFAULT_POSITIVE_TTL,
            unknown: DEFAULT_UNKNOWN_TTL,
        }
    }
}

impl CacheTtl {
    /// TTL for `result`.
    #[must_use]
    pub const fn for_result(&self, result: &AvailabilityResult) -> Duration {
        match (result.outcome, result.source) {
            (Outcome::Unknown, _) | (_, Source::Simulated) => self.unknown,
            _ => self.positive,
        }
    }
}

type InFlight = Arc<OnceCell<AvailabilityResult>>;

/// Availability cache in front of the [`AvailabilityClient`](crate::AvailabilityClient).
pub struct AvailabilityCache {
    backend: Arc<dyn CacheBackend>,
    ttl: CacheTtl,
    in_flight: Mutex<HashMap<String, InFlight>>,
}

impl AvailabilityCache {
    /// Cache over `backend` with default TTLs.
    #[must_use]
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            ttl: CacheTtl::default(),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Override the TTLs.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: CacheTtl) -> Self {
        self.ttl = ttl;
        self
    }

    /// Storage backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    /// Cached result for `query`, or the result of `compute`.
    ///
    /// Hits are tagged [`Source::Cache`], except simulated results, which
    /// keep their provenance.
    pub async fn get_or_compute<F, Fut>(&self, query: &AvailabilityQuery, compute: F) -> AvailabilityResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AvailabilityResult>,
    {
        let key = query.cache_key();

        if let Some(hit) = self.lookup(&key).await {
            return hit;
        }

        let cell = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            let cell = in_flight.entry(key.clone()).or_default();
            Arc::clone(cell)
        };

        let result = cell
            .get_or_init(|| async {
                // A leader that finished between our miss and joining the cell
                // has already stored its answer.
                if let Some(hit) = self.lookup(&key).await {
                    return hit;
                }
                let computed = compute().await;
                self.store(&key, &computed).await;
                computed
            })
            .await
            .clone();

        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if in_flight.get(&key).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
                in_flight.remove(&key);
            }
        }

        result
    }

    async fn lookup(&self, key: &str) -> Option<AvailabilityResult> {
        match self.backend.get(key).await {
            Ok(Some(bytes)) => match bincode::deserialize::<AvailabilityResult>(&bytes) {
                Ok(result) => {
                    AvailabilityMetrics::record_cache_hit();
                    if result.source == Source::Simulated {
                        Some(result)
                    } else {
                        Some(result.with_source(Source::Cache))
                    }
                }
                Err(e) => {
                    AvailabilityMetrics::record_cache_error(self.backend.name());
                    tracing::warn!(key, error = %e, "Discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => {
                AvailabilityMetrics::record_cache_miss();
                None
            }
            Err(e) => {
                AvailabilityMetrics::record_cache_error(self.backend.name());
                tracing::warn!(key, backend = self.backend.name(), error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    async fn store(&self, key: &str, result: &AvailabilityResult) {
        let bytes = match bincode::serialize(result) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key, error = %e, "Could not encode availability result");
                return;
            }
        };
        if let Err(e) = self.backend.set(key, bytes, self.ttl.for_result(result)).await {
            AvailabilityMetrics::record_cache_error(self.backend.name());
            tracing::warn!(key, backend = self.backend.name(), error = %e, "Cache write failed");
        }
    }
}
