//! Prometheus metrics for the search engine.
//!
//! Covers:
//! - Search requests and latency
//! - Availability lookups by outcome and cache effectiveness
//! - Event ingestion outcomes and dead letters
//! - Circuit breaker state and retries
//!
//! [`MetricsServer`] installs the global recorder together with the
//! exporter's own HTTP listener, so scrapes never touch the API port.
//!
//! # Example
//!
//! ```rust,no_run
//! use staysearch_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus exporter listening on its own address.
#[derive(Debug, Clone, Copy)]
pub struct MetricsServer {
    addr: SocketAddr,
}

impl MetricsServer {
    /// Create a metrics server bound to `addr` once started.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Address scraped by Prometheus.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Register descriptions, install the global recorder and start the
    /// HTTP listener.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if the exporter cannot be built or installed.
    /// A recorder that is already installed (common in tests) is not an
    /// error.
    pub fn start(&self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install() {
            Ok(()) => {
                tracing::info!(addr = %self.addr, "Metrics server started");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }
}

fn register_metrics() {
    // Search
    describe_counter!("search_requests_total", "Search requests by result (ok, invalid, index_error)");
    describe_histogram!("search_duration_seconds", "End-to-end search latency");
    describe_counter!("search_degraded_total", "Searches answered with a degraded annotation");

    // Availability
    describe_counter!("availability_lookups_total", "Availability lookups by outcome and source");
    describe_histogram!("availability_oracle_duration_seconds", "Oracle call latency");
    describe_counter!("availability_cache_hits_total", "Availability cache hits");
    describe_counter!("availability_cache_misses_total", "Availability cache misses");
    describe_counter!("availability_cache_errors_total", "Availability cache backend failures");
    describe_counter!("availability_fail_fast_total", "Batches short-circuited by the degradation policy");

    // Ingestion
    describe_counter!("ingest_events_total", "Change events by kind and outcome");
    describe_counter!("ingest_dead_letters_total", "Change events parked after repeated failure");
    describe_histogram!("ingest_event_duration_seconds", "Time to apply one change event");

    // Resilience
    describe_gauge!("circuit_breaker_state", "Circuit breaker state (0=closed, 1=half-open, 2=open)");
    describe_counter!("circuit_breaker_rejections_total", "Calls rejected by an open circuit");
    describe_counter!("retry_attempts_total", "Retry attempts");
    describe_counter!("retry_successes_total", "Operations that succeeded after retrying");
    describe_counter!("retry_exhausted_total", "Operations that exhausted their retries");
}

/// Search metrics recorder.
pub struct SearchMetrics;

impl SearchMetrics {
    /// Record a finished search.
    pub fn record_request(result: &'static str, duration: Duration) {
        counter!("search_requests_total", "result" => result).increment(1);
        histogram!("search_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a degraded answer.
    pub fn record_degraded() {
        counter!("search_degraded_total").increment(1);
    }
}

/// Availability metrics recorder.
pub struct AvailabilityMetrics;

impl AvailabilityMetrics {
    /// Record a normalized lookup.
    pub fn record_lookup(outcome: &'static str, source: &'static str) {
        counter!("availability_lookups_total", "outcome" => outcome, "source" => source).increment(1);
    }

    /// Record an oracle round trip.
    pub fn record_oracle_call(duration: Duration) {
        histogram!("availability_oracle_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a cache hit.
    pub fn record_cache_hit() {
        counter!("availability_cache_hits_total").increment(1);
    }

    /// Record a cache miss.
    pub fn record_cache_miss() {
        counter!("availability_cache_misses_total").increment(1);
    }

    /// Record a cache backend failure.
    pub fn record_cache_error(backend: &'static str) {
        counter!("availability_cache_errors_total", "backend" => backend).increment(1);
    }

    /// Record a batch that skipped the oracle entirely.
    pub fn record_fail_fast() {
        counter!("availability_fail_fast_total").increment(1);
    }
}

/// Ingestion metrics recorder.
pub struct IngestMetrics;

impl IngestMetrics {
    /// Record a settled event.
    pub fn record_event(kind: &'static str, outcome: &'static str, duration: Duration) {
        counter!("ingest_events_total", "kind" => kind, "outcome" => outcome).increment(1);
        histogram!("ingest_event_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a parked event.
    pub fn record_dead_letter() {
        counter!("ingest_dead_letters_total").increment(1);
    }
}

/// Circuit breaker metrics recorder.
pub struct CircuitBreakerMetrics;

impl CircuitBreakerMetrics {
    /// Record circuit breaker state.
    ///
    /// 0 = Closed, 1 = `HalfOpen`, 2 = Open
    pub fn record_state(dependency: &'static str, state: f64) {
        gauge!("circuit_breaker_state", "dependency" => dependency).set(state);
    }

    /// Record a rejected call (circuit open).
    pub fn record_rejection(dependency: &'static str) {
        counter!("circuit_breaker_rejections_total", "dependency" => dependency).increment(1);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("retry_attempts_total").increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!("retry_successes_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("retry_exhausted_total").increment(1);
    }
}
