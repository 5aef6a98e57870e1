//! Dependency health report.

use crate::client::AvailabilityClient;
use serde::Serialize;
use staysearch_core::event_bus::EventBus;
use staysearch_core::index::IndexStore;
use staysearch_projections::{DeadLetterStore, ParkedEvent};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Default bound on each dependency probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

const RECENT_DEAD_LETTERS: usize = 10;

/// State of one dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyStatus {
    /// Serving
    Up,
    /// Failing or not answering
    Down,
}

/// Per-dependency states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dependencies {
    /// Index store
    pub index_store: DependencyStatus,
    /// Change-event transport
    pub event_transport: DependencyStatus,
    /// Availability oracle (circuit and credentials)
    pub availability_oracle: DependencyStatus,
}

/// Dead-letter details.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadLetterSummary {
    /// Events parked since startup
    pub count: u64,
    /// Newest parked events
    pub recent: Vec<ParkedEvent>,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    /// `Up` only when every dependency is up
    pub status: DependencyStatus,
    /// Per-dependency states
    pub dependencies: Dependencies,
    /// Dead-letter details
    pub dead_letters: DeadLetterSummary,
}

impl HealthReport {
    /// Whether every dependency is up.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == DependencyStatus::Up
    }
}

/// Probes every dependency concurrently.
pub struct HealthMonitor {
    index: Arc<dyn IndexStore>,
    event_bus: Arc<dyn EventBus>,
    client: Arc<AvailabilityClient>,
    dead_letters: Arc<dyn DeadLetterStore>,
    probe_timeout: Duration,
}

impl HealthMonitor {
    /// Create a monitor.
    #[must_use]
    pub fn new(
        index: Arc<dyn IndexStore>,
        event_bus: Arc<dyn EventBus>,
        client: Arc<AvailabilityClient>,
        dead_letters: Arc<dyn DeadLetterStore>,
    ) -> Self {
        Self {
            index,
            event_bus,
            client,
            dead_letters,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Override the per-probe timeout.
    #[must_use]
    pub const fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Probe all dependencies.
    pub async fn check(&self) -> HealthReport {
        let (index_store, event_transport, availability_oracle) = tokio::join!(
            self.probe("index_store", self.index.ping()),
            self.probe("event_transport", self.event_bus.ping()),
            self.oracle_status(),
        );

        let dependencies = Dependencies {
            index_store,
            event_transport,
            availability_oracle,
        };
        let all_up = [index_store, event_transport, availability_oracle]
            .iter()
            .all(|s| *s == DependencyStatus::Up);

        HealthReport {
            status: if all_up {
                DependencyStatus::Up
            } else {
                DependencyStatus::Down
            },
            dependencies,
            dead_letters: DeadLetterSummary {
                count: self.dead_letters.count(),
                recent: self.dead_letters.recent(RECENT_DEAD_LETTERS),
            },
        }
    }

    async fn probe<E, F>(&self, dependency: &'static str, ping: F) -> DependencyStatus
    where
        E: std::fmt::Display,
        F: Future<Output = Result<(), E>>,
    {
        match tokio::time::timeout(self.probe_timeout, ping).await {
            Ok(Ok(())) => DependencyStatus::Up,
            Ok(Err(e)) => {
                tracing::warn!(dependency, error = %e, "Health probe failed");
                DependencyStatus::Down
            }
            Err(_) => {
                tracing::warn!(dependency, "Health probe timed out");
                DependencyStatus::Down
            }
        }
    }

    async fn oracle_status(&self) -> DependencyStatus {
        if self.client.breaker().is_rejecting().await {
            return DependencyStatus::Down;
        }
        match self.client.ensure_ready().await {
            Err(e) if e.is_credential_failure() => {
                tracing::warn!(dependency = "availability_oracle", error = %e, "Health probe failed");
                DependencyStatus::Down
            }
            _ => DependencyStatus::Up,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use staysearch_core::availability::OracleError;
    use staysearch_projections::{InMemoryDeadLetterStore, InMemoryIndexStore};
    use staysearch_testing::{fixtures, FailingIndexStore, InMemoryEventBus, StubOracle};

    fn monitor(index: Arc<dyn IndexStore>, bus: InMemoryEventBus, oracle: StubOracle) -> HealthMonitor {
        HealthMonitor::new(
            index,
            Arc::new(bus),
            Arc::new(AvailabilityClient::new(Arc::new(oracle))),
            Arc::new(InMemoryDeadLetterStore::default()),
        )
    }

    #[tokio::test]
    async fn all_up_is_healthy() {
        let report = monitor(Arc::new(InMemoryIndexStore::new()), InMemoryEventBus::new(), StubOracle::new())
            .check()
            .await;

        assert!(report.is_healthy());
        assert_eq!(report.dead_letters.count, 0);
    }

    #[tokio::test]
    async fn index_outage_is_reported() {
        let report = monitor(Arc::new(FailingIndexStore), InMemoryEventBus::new(), StubOracle::new())
            .check()
            .await;

        assert!(!report.is_healthy());
        assert_eq!(report.dependencies.index_store, DependencyStatus::Down);
        assert_eq!(report.dependencies.event_transport, DependencyStatus::Up);
    }

    #[tokio::test]
    async fn transport_and_credentials_are_probed() {
        let bus = InMemoryEventBus::new();
        bus.set_healthy(false);
        let oracle = StubOracle::new().with_readiness(Err(OracleError::Unauthorized("revoked".into())));

        let report = monitor(Arc::new(InMemoryIndexStore::new()), bus, oracle).check().await;

        assert_eq!(report.dependencies.event_transport, DependencyStatus::Down);
        assert_eq!(report.dependencies.availability_oracle, DependencyStatus::Down);
    }

    #[tokio::test]
    async fn dead_letters_are_listed() {
        let dead_letters = Arc::new(InMemoryDeadLetterStore::default());
        dead_letters.record(ParkedEvent {
            subject_id: None,
            topic: "catalog.item-events".to_string(),
            payload: "{".to_string(),
            reason: "malformed".to_string(),
            attempts: 1,
            parked_at: fixtures::at(0),
        });
        let monitor = HealthMonitor::new(
            Arc::new(InMemoryIndexStore::new()),
            Arc::new(InMemoryEventBus::new()),
            Arc::new(AvailabilityClient::new(Arc::new(StubOracle::new()))),
            dead_letters,
        );

        let report = monitor.check().await;

        assert_eq!(report.dead_letters.count, 1);
        assert_eq!(report.dead_letters.recent[0].reason, "malformed");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["dependencies"]["index_store"], "up");
    }
}
