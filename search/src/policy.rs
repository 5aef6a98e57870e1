//! Global fallback rules for availability.
//!
//! Two decisions live here:
//!
//! - [`DegradationPolicy::assess`] runs once per search batch and decides
//!   whether the oracle is worth calling at all
//! - [`DegradationPolicy::classify`] runs per result and decides whether the
//!   item is shown, and with what confidence
//!
//! An oracle failure is never treated as availability. `unknown` and
//! `unavailable` results are always excluded; simulated results are shown
//! only when explicitly allowed, and then only as `unconfirmed`.

use crate::client::AvailabilityClient;
use serde::Serialize;
use staysearch_core::availability::{AvailabilityResult, Outcome, Source};
use staysearch_runtime::metrics::AvailabilityMetrics;

/// Whether a batch may call the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleGate {
    /// Dispatch lookups normally
    Open,
    /// Skip the oracle; every lookup is `unknown`
    FailFast {
        /// Human-readable cause, surfaced as a notice
        reason: String,
    },
}

/// How much a shown item's availability can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Confirmed by the oracle (directly or through the cache)
    Confirmed,
    /// Produced by a simulated oracle
    Unconfirmed,
}

/// Why an item is left out of a date-ranged search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionReason {
    /// The oracle said no
    Unavailable,
    /// No trustworthy answer
    Unknown,
    /// Simulated answers are not allowed
    SimulatedNotAllowed,
}

/// Per-result decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inclusion {
    /// Show the item
    Include(Confidence),
    /// Leave the item out
    Exclude(ExclusionReason),
}

/// Fallback rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct DegradationPolicy {
    allow_simulated: bool,
}

impl DegradationPolicy {
    /// Policy that only shows confirmed results.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            allow_simulated: false,
        }
    }

    /// Show simulated results as `unconfirmed`.
    #[must_use]
    pub const fn allow_simulated(mut self, allow: bool) -> Self {
        self.allow_simulated = allow;
        self
    }

    /// Whether simulated results are shown.
    #[must_use]
    pub const fn allows_simulated(&self) -> bool {
        self.allow_simulated
    }

    /// Gate one batch of lookups.
    ///
    /// Fails fast when the oracle's circuit is open or its credential layer
    /// reports an authentication failure. Any other readiness error leaves
    /// the gate open; individual lookups will then degrade on their own.
    pub async fn assess(&self, client: &AvailabilityClient) -> OracleGate {
        if client.breaker().is_rejecting().await {
            AvailabilityMetrics::record_fail_fast();
            return OracleGate::FailFast {
                reason: "availability oracle circuit is open".to_string(),
            };
        }

        match client.ensure_ready().await {
            Ok(()) => OracleGate::Open,
            Err(e) if e.is_credential_failure() => {
                AvailabilityMetrics::record_fail_fast();
                tracing::warn!(error = %e, "Oracle credentials unavailable, skipping availability checks");
                OracleGate::FailFast {
                    reason: format!("availability oracle authentication failed: {e}"),
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Oracle readiness check failed, dispatching lookups anyway");
                OracleGate::Open
            }
        }
    }

    /// Decide whether `result` is shown.
    #[must_use]
    pub const fn classify(&self, result: &AvailabilityResult) -> Inclusion {
        match (result.outcome, result.source) {
            (Outcome::Unknown, _) => Inclusion::Exclude(ExclusionReason::Unknown),
            (Outcome::Unavailable, _) => Inclusion::Exclude(ExclusionReason::Unavailable),
            (Outcome::Available, Source::Simulated) => {
                if self.allow_simulated {
                    Inclusion::Include(Confidence::Unconfirmed)
                } else {
                    Inclusion::Exclude(ExclusionReason::SimulatedNotAllowed)
                }
            }
            (Outcome::Available, Source::Oracle | Source::Cache) => {
                Inclusion::Include(Confidence::Confirmed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use staysearch_core::availability::OracleError;
    use staysearch_runtime::CircuitBreakerConfig;
    use staysearch_testing::{fixtures, StubOracle};
    use std::sync::Arc;
    use std::time::Duration;

    fn result(outcome_available: bool, source: Source) -> AvailabilityResult {
        let query = fixtures::query("H1", "2026-06-01", "2026-06-03", 1);
        let quote = if outcome_available {
            fixtures::available_quote(90.0)
        } else {
            fixtures::sold_out_quote()
        };
        AvailabilityResult::from_quote(query, quote, source)
    }

    #[test]
    fn unknown_and_unavailable_are_never_included() {
        let policy = DegradationPolicy::new().allow_simulated(true);
        let unknown = AvailabilityResult::unknown(
            fixtures::query("H1", "2026-06-01", "2026-06-03", 1),
            Source::Simulated,
        );

        assert_eq!(policy.classify(&unknown), Inclusion::Exclude(ExclusionReason::Unknown));
        assert_eq!(
            policy.classify(&result(false, Source::Oracle)),
            Inclusion::Exclude(ExclusionReason::Unavailable)
        );
    }

    #[test]
    fn oracle_and_cache_results_are_confirmed() {
        let policy = DegradationPolicy::new();
        assert_eq!(
            policy.classify(&result(true, Source::Oracle)),
            Inclusion::Include(Confidence::Confirmed)
        );
        assert_eq!(
            policy.classify(&result(true, Source::Cache)),
            Inclusion::Include(Confidence::Confirmed)
        );
    }

    #[test]
    fn simulated_results_need_opt_in() {
        assert_eq!(
            DegradationPolicy::new().classify(&result(true, Source::Simulated)),
            Inclusion::Exclude(ExclusionReason::SimulatedNotAllowed)
        );
        assert_eq!(
            DegradationPolicy::new()
                .allow_simulated(true)
                .classify(&result(true, Source::Simulated)),
            Inclusion::Include(Confidence::Unconfirmed)
        );
    }

    #[tokio::test]
    async fn credential_failure_fails_fast() {
        let oracle = StubOracle::new().with_readiness(Err(OracleError::CredentialsUnavailable(
            "token endpoint down".into(),
        )));
        let client = AvailabilityClient::new(Arc::new(oracle));

        assert!(matches!(
            DegradationPolicy::new().assess(&client).await,
            OracleGate::FailFast { .. }
        ));
    }

    #[tokio::test]
    async fn other_readiness_errors_keep_gate_open() {
        let oracle = StubOracle::new().with_readiness(Err(OracleError::Transport("reset".into())));
        let client = AvailabilityClient::new(Arc::new(oracle));

        assert_eq!(DegradationPolicy::new().assess(&client).await, OracleGate::Open);
    }

    #[tokio::test]
    async fn open_circuit_fails_fast() {
        let client = AvailabilityClient::with_config(
            Arc::new(StubOracle::unreachable()),
            crate::client::ClientConfig::default().with_breaker(
                CircuitBreakerConfig::builder()
                    .failure_threshold(1)
                    .timeout(Duration::from_secs(60))
                    .build(),
            ),
        );
        client
            .check(&fixtures::query("H1", "2026-06-01", "2026-06-03", 1))
            .await;

        assert!(matches!(
            DegradationPolicy::new().assess(&client).await,
            OracleGate::FailFast { .. }
        ));
    }
}
