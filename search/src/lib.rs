//! # StaySearch Search
//!
//! Query-time half of the engine: merges the index with live availability.
//!
//! ## Components
//!
//! - [`AvailabilityClient`]: oracle calls with a hard timeout and a circuit
//!   breaker; never fails, answers `unknown` instead
//! - [`AvailabilityCache`]: short-TTL cache with single-flight in front of the
//!   client, over any [`CacheBackend`](staysearch_core::cache::CacheBackend)
//!   ([`InMemoryCacheBackend`] here, Redis in `staysearch-clients`)
//! - [`DegradationPolicy`]: per-batch oracle gate and per-result inclusion
//! - [`QueryAggregator`]: scan, bounded fan-out, merge, rank, paginate
//! - [`ItemLookup`]: point lookup with a cold catalog fallback
//! - [`HealthMonitor`]: dependency probes and dead-letter details
//! - [`SimulatedOracle`]: opt-in stand-in oracle whose answers are never
//!   confirmations
//!
//! ## Example
//!
//! ```ignore
//! let client = Arc::new(AvailabilityClient::new(oracle));
//! let cache = Arc::new(AvailabilityCache::new(Arc::new(InMemoryCacheBackend::default())));
//! let aggregator = QueryAggregator::new(index, cache, client);
//!
//! let response = aggregator
//!     .search(&SearchRequest::new().region("bariloche").stay(stay).guests(2))
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregator;
pub mod cache;
pub mod client;
pub mod health;
pub mod lookup;
pub mod memory;
pub mod model;
pub mod policy;
pub mod simulated;

pub use aggregator::{AggregatorConfig, QueryAggregator, SearchError};
pub use cache::{AvailabilityCache, CacheTtl};
pub use client::{AvailabilityClient, ClientConfig};
pub use health::{DependencyStatus, HealthMonitor, HealthReport};
pub use lookup::{ItemLookup, LookupError};
pub use memory::InMemoryCacheBackend;
pub use model::{AvailabilityStatus, SearchHit, SearchRequest, SearchResponse};
pub use policy::{Confidence, DegradationPolicy, Inclusion, OracleGate};
pub use simulated::SimulatedOracle;
