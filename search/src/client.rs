//! Bounded-latency wrapper around the availability oracle.
//!
//! [`AvailabilityClient::check`] never fails: a timeout, an oracle error or an
//! open circuit all become a deterministic `unknown` result. The client does
//! not retry; the cache and the caller's deadline are the only second chances.

use staysearch_core::availability::{
    AvailabilityOracle, AvailabilityQuery, AvailabilityResult, OracleError, Outcome, Source,
};
use staysearch_runtime::metrics::AvailabilityMetrics;
use staysearch_runtime::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default hard timeout for a single oracle call.
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(3);

/// Availability client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Hard per-call timeout
    pub timeout: Duration,
    /// Circuit breaker guarding the oracle
    pub breaker: CircuitBreakerConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_ORACLE_TIMEOUT,
            breaker: CircuitBreakerConfig::builder()
                .failure_threshold(5)
                .timeout(Duration::from_secs(30))
                .success_threshold(1)
                .build(),
        }
    }
}

impl ClientConfig {
    /// Override the per-call timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the circuit breaker settings.
    #[must_use]
    pub const fn with_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }
}

/// Oracle access with timeout, circuit breaking and normalization.
pub struct AvailabilityClient {
    oracle: Arc<dyn AvailabilityOracle>,
    timeout: Duration,
    breaker: CircuitBreaker,
}

impl AvailabilityClient {
    /// Wrap `oracle` with the default configuration.
    #[must_use]
    pub fn new(oracle: Arc<dyn AvailabilityOracle>) -> Self {
        Self::with_config(oracle, ClientConfig::default())
    }

    /// Wrap `oracle` with an explicit configuration.
    #[must_use]
    pub fn with_config(oracle: Arc<dyn AvailabilityOracle>, config: ClientConfig) -> Self {
        Self {
            oracle,
            timeout: config.timeout,
            breaker: CircuitBreaker::new("availability_oracle", config.breaker),
        }
    }

    /// Circuit breaker guarding the oracle.
    #[must_use]
    pub const fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Provenance of results produced by the wrapped oracle.
    #[must_use]
    pub fn source(&self) -> Source {
        self.oracle.source()
    }

    /// Ask the oracle's credential layer whether lookups can be made,
    /// bounded by the per-call timeout.
    ///
    /// # Errors
    ///
    /// Returns the oracle's error, or [`OracleError::Timeout`].
    pub async fn ensure_ready(&self) -> Result<(), OracleError> {
        tokio::time::timeout(self.timeout, self.oracle.ensure_ready())
            .await
            .unwrap_or(Err(OracleError::Timeout))
    }

    /// Check one query. Always returns a result.
    pub async fn check(&self, query: &AvailabilityQuery) -> AvailabilityResult {
        let source = self.oracle.source();
        let started = Instant::now();

        let outcome = self
            .breaker
            .call(|| async {
                tokio::time::timeout(self.timeout, self.oracle.quote(query))
                    .await
                    .unwrap_or(Err(OracleError::Timeout))
            })
            .await;

        let result = match outcome {
            Ok(quote) => {
                AvailabilityMetrics::record_oracle_call(started.elapsed());
                let result = AvailabilityResult::from_quote(query.clone(), quote, source);
                if result.outcome == Outcome::Unknown {
                    tracing::warn!(
                        item_id = %query.item_id,
                        "Bookable quote without price or currency, answering unknown"
                    );
                }
                result
            }
            Err(CircuitBreakerError::Open) => {
                tracing::debug!(item_id = %query.item_id, "Oracle circuit open, answering unknown");
                AvailabilityResult::unknown(query.clone(), source)
            }
            Err(CircuitBreakerError::Inner(error)) => {
                AvailabilityMetrics::record_oracle_call(started.elapsed());
                tracing::warn!(
                    item_id = %query.item_id,
                    error = %error,
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "Availability lookup failed, answering unknown"
                );
                AvailabilityResult::unknown(query.clone(), source)
            }
        };

        AvailabilityMetrics::record_lookup(result.outcome.as_str(), result.source.as_str());
        result
    }
}
