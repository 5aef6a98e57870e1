//! `EventIngestor`: keeps the index consistent with catalog change events.
//!
//! # Overview
//!
//! The ingestor subscribes to the change-event topic and, for each delivery:
//! 1. Decodes and validates the payload
//! 2. Serializes work on the subject id through a [`KeyedLock`]
//! 3. Skips events that are older than, or duplicates of, the last applied
//!    event for that id
//! 4. Resolves thin events through the catalog (with in-process retries)
//! 5. Upserts or marks inactive in the [`IndexStore`]
//! 6. Settles the delivery: `Ack`, `Nack` for a retryable failure, or `Park`
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Event Bus  │ (Redpanda/Kafka)
//! └──────┬──────┘
//!        │ deliveries
//!        ▼
//! ┌─────────────────┐      ┌──────────────┐
//! │  EventIngestor  │─────►│CatalogClient │ (thin events)
//! └────┬────────┬───┘      └──────────────┘
//!      │        │
//!      ▼        ▼
//! ┌──────────┐ ┌──────────────┐
//! │IndexStore│ │DeadLetterStore│
//! └──────────┘ └──────────────┘
//! ```
//!
//! # Ordering
//!
//! Events for one id are applied in timestamp order regardless of arrival
//! order: a per-id mark remembers the version of the last applied event, and
//! the index itself rejects writes older than what it holds. At equal
//! timestamps the kind decides: `created < updated < deleted`.
//!
//! # Example
//!
//! ```ignore
//! let ingestor = Arc::new(EventIngestor::new(index, catalog, dead_letters));
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! tokio::spawn(Arc::clone(&ingestor).run(event_bus, "catalog.item-events".into(), shutdown_rx));
//!
//! // Later:
//! shutdown_tx.send(true).ok();
//! ```

use crate::dead_letter::{DeadLetterStore, ParkedEvent};
use futures::StreamExt;
use staysearch_core::catalog::{CatalogClient, CatalogError, SnapshotError};
use staysearch_core::environment::{Clock, SystemClock};
use staysearch_core::event::{ChangeEvent, ChangeKind, EventError};
use staysearch_core::event_bus::{Acknowledgement, Delivery, EventBus, EventBusError};
use staysearch_core::index::{IndexError, IndexStore, Version, WriteOutcome};
use staysearch_core::item::ItemId;
use staysearch_runtime::keyed_lock::KeyedLock;
use staysearch_runtime::metrics::IngestMetrics;
use staysearch_runtime::retry::{retry_if, RetryPolicy};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

/// Errors raised while ingesting an event.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Payload failed to decode or validate
    #[error(transparent)]
    Event(#[from] EventError),

    /// Catalog returned a snapshot that does not describe the subject
    #[error("Catalog snapshot for {subject} is invalid: {source}")]
    InvalidCatalogSnapshot {
        /// Subject of the event
        subject: ItemId,
        /// Validation failure
        #[source]
        source: SnapshotError,
    },

    /// Thin event could not be resolved
    #[error("Catalog lookup failed: {0}")]
    Catalog(#[from] CatalogError),

    /// Index write failed
    #[error("Index write failed: {0}")]
    Index(#[from] IndexError),

    /// Subscription could not be established
    #[error("Subscription failed: {0}")]
    Subscription(#[from] EventBusError),
}

impl IngestError {
    /// Whether redelivery might succeed.
    ///
    /// Bad payloads never get better. A missing catalog record may still be
    /// replicating, so it is retried like any dependency failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Catalog(_) | Self::Index(_) | Self::Subscription(_)
        )
    }
}

/// Effect of one event on the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Document created or replaced
    Upserted,
    /// Document marked inactive
    Deactivated,
    /// Older than what is already applied
    Stale,
    /// Same kind and version as the last applied event
    Duplicate,
}

impl IngestOutcome {
    /// Metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upserted => "upserted",
            Self::Deactivated => "deactivated",
            Self::Stale => "stale",
            Self::Duplicate => "duplicate",
        }
    }
}

/// Ingestor tuning.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Deliveries of one event before it is parked
    pub max_attempts: u32,
    /// Events processed at once across different ids
    pub max_concurrent_events: usize,
    /// In-process retries for transient catalog failures
    pub catalog_retry: RetryPolicy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_concurrent_events: 16,
            catalog_retry: RetryPolicy::default(),
        }
    }
}

impl IngestConfig {
    /// Set the delivery attempts before parking (minimum 1).
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the cross-id concurrency bound (minimum 1).
    #[must_use]
    pub fn with_max_concurrent_events(mut self, limit: usize) -> Self {
        self.max_concurrent_events = limit.max(1);
        self
    }

    /// Set the catalog retry policy.
    #[must_use]
    pub fn with_catalog_retry(mut self, policy: RetryPolicy) -> Self {
        self.catalog_retry = policy;
        self
    }
}

/// Consumes change events and applies them to the index.
pub struct EventIngestor {
    index: Arc<dyn IndexStore>,
    catalog: Arc<dyn CatalogClient>,
    dead_letters: Arc<dyn DeadLetterStore>,
    clock: Arc<dyn Clock>,
    config: IngestConfig,
    locks: KeyedLock<ItemId>,
    /// Version and kind of the last event applied per id
    marks: Mutex<HashMap<ItemId, Version>>,
}

impl EventIngestor {
    /// Create an ingestor with default tuning and the system clock.
    #[must_use]
    pub fn new(
        index: Arc<dyn IndexStore>,
        catalog: Arc<dyn CatalogClient>,
        dead_letters: Arc<dyn DeadLetterStore>,
    ) -> Self {
        Self {
            index,
            catalog,
            dead_letters,
            clock: Arc::new(SystemClock),
            config: IngestConfig::default(),
            locks: KeyedLock::new(),
            marks: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the tuning.
    #[must_use]
    pub fn with_config(mut self, config: IngestConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the clock used to timestamp parked events.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Consume `topic` until `shutdown` flips to `true`.
    ///
    /// Deliveries are processed concurrently up to `max_concurrent_events`.
    /// On shutdown no new deliveries are taken and in-flight ones finish.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Subscription`] if the subscription cannot be
    /// established.
    pub async fn run(
        self: Arc<Self>,
        event_bus: Arc<dyn EventBus>,
        topic: String,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), IngestError> {
        tracing::info!(
            topic = %topic,
            max_attempts = self.config.max_attempts,
            max_concurrent = self.config.max_concurrent_events,
            "Starting event ingestor"
        );

        let mut stream = event_bus.subscribe(&[topic.as_str()]).await?;
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_events));
        let mut in_flight = JoinSet::new();

        while !*shutdown.borrow() {
            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!(topic = %topic, "Shutdown signal received");
                        break;
                    }
                }

                next = stream.next() => {
                    match next {
                        Some(Ok(delivery)) => {
                            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                                break;
                            };
                            let ingestor = Arc::clone(&self);
                            in_flight.spawn(async move {
                                ingestor.process(delivery).await;
                                drop(permit);
                            });
                        }
                        Some(Err(e)) => {
                            tracing::error!(topic = %topic, error = %e, "Error receiving event from bus");
                        }
                        None => {
                            tracing::warn!(topic = %topic, "Event stream ended");
                            break;
                        }
                    }
                }

                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Ingest task failed");
                    }
                }
            }
        }

        let pending = in_flight.len();
        if pending > 0 {
            tracing::info!(pending, "Waiting for in-flight events");
        }
        while in_flight.join_next().await.is_some() {}

        tracing::info!(topic = %topic, "Event ingestor stopped");
        Ok(())
    }

    /// Process and settle one delivery, returning the acknowledgement sent.
    pub async fn process(&self, delivery: Delivery) -> Acknowledgement {
        let started = Instant::now();

        let (ack, kind, outcome) = match ChangeEvent::decode(&delivery.payload) {
            Err(e) => {
                let ack = self.park(&delivery, None, &IngestError::from(e));
                (ack, "unknown", "parked")
            }
            Ok(event) => match self.apply(&event).await {
                Ok(outcome) => (Acknowledgement::Ack, event.kind.as_str(), outcome.as_str()),
                Err(e) if e.is_retryable() && delivery.attempt < self.config.max_attempts => {
                    tracing::warn!(
                        subject_id = %event.subject_id,
                        kind = %event.kind,
                        attempt = delivery.attempt,
                        max_attempts = self.config.max_attempts,
                        error = %e,
                        "Event failed, requesting redelivery"
                    );
                    (Acknowledgement::Nack, event.kind.as_str(), "retried")
                }
                Err(e) => {
                    let ack = self.park(&delivery, Some(event.subject_id.clone()), &e);
                    (ack, event.kind.as_str(), "parked")
                }
            },
        };

        IngestMetrics::record_event(kind, outcome, started.elapsed());
        delivery.acknowledge(ack.clone());
        ack
    }

    /// Apply a decoded event to the index.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] if the catalog lookup or the index write fails.
    pub async fn apply(&self, event: &ChangeEvent) -> Result<IngestOutcome, IngestError> {
        let _guard = self.locks.lock(&event.subject_id).await;
        let version = event.version();

        if let Some(skip) = self.check_mark(&event.subject_id, version) {
            tracing::debug!(
                subject_id = %event.subject_id,
                kind = %event.kind,
                outcome = skip.as_str(),
                "Skipping event"
            );
            return Ok(skip);
        }

        let written = match event.kind {
            ChangeKind::Deleted => {
                let written = self.index.mark_inactive(&event.subject_id, version).await?;
                (written, IngestOutcome::Deactivated)
            }
            ChangeKind::Created | ChangeKind::Updated => {
                let snapshot = match &event.snapshot {
                    Some(snapshot) => snapshot.clone(),
                    None => self.fetch_snapshot(&event.subject_id).await?,
                };
                let item = snapshot.into_item(event.subject_id.clone());
                let written = self.index.upsert(item, version).await?;
                (written, IngestOutcome::Upserted)
            }
        };

        let outcome = match written {
            (WriteOutcome::Stale, _) => IngestOutcome::Stale,
            (WriteOutcome::Applied, applied) => applied,
        };

        self.set_mark(&event.subject_id, version);

        tracing::info!(
            subject_id = %event.subject_id,
            kind = %event.kind,
            timestamp = %event.timestamp,
            outcome = outcome.as_str(),
            "Event applied"
        );
        Ok(outcome)
    }

    fn check_mark(&self, id: &ItemId, version: Version) -> Option<IngestOutcome> {
        let marks = self.marks.lock().unwrap_or_else(PoisonError::into_inner);
        let last = marks.get(id)?;
        match version.cmp(last) {
            Ordering::Less => Some(IngestOutcome::Stale),
            Ordering::Equal => Some(IngestOutcome::Duplicate),
            Ordering::Greater => None,
        }
    }

    fn set_mark(&self, id: &ItemId, version: Version) {
        let mut marks = self.marks.lock().unwrap_or_else(PoisonError::into_inner);
        let newer = marks.get(id).is_none_or(|last| version > *last);
        if newer {
            marks.insert(id.clone(), version);
        }
    }

    async fn fetch_snapshot(
        &self,
        id: &ItemId,
    ) -> Result<staysearch_core::catalog::CatalogSnapshot, IngestError> {
        let snapshot = retry_if(
            &self.config.catalog_retry,
            || self.catalog.fetch(id),
            CatalogError::is_transient,
        )
        .await?;

        snapshot
            .validate(id)
            .map_err(|source| IngestError::InvalidCatalogSnapshot {
                subject: id.clone(),
                source,
            })?;
        Ok(snapshot)
    }

    fn park(&self, delivery: &Delivery, subject_id: Option<ItemId>, error: &IngestError) -> Acknowledgement {
        let reason = error.to_string();

        tracing::error!(
            topic = %delivery.topic,
            subject_id = subject_id.as_ref().map_or("-", ItemId::as_str),
            attempt = delivery.attempt,
            reason = %reason,
            "Parking event"
        );

        self.dead_letters.record(ParkedEvent {
            subject_id,
            topic: delivery.topic.clone(),
            payload: String::from_utf8_lossy(&delivery.payload).into_owned(),
            reason: reason.clone(),
            attempts: delivery.attempt,
            parked_at: self.clock.now(),
        });
        IngestMetrics::record_dead_letter();

        Acknowledgement::Park { reason }
    }
}

impl std::fmt::Debug for EventIngestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventIngestor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
