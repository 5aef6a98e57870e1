//! Dead-letter bookkeeping for events the ingestor gave up on.

use chrono::{DateTime, Utc};
use serde::Serialize;
use staysearch_core::item::ItemId;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// An event that was parked after repeated or permanent failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParkedEvent {
    /// Subject of the event, if the payload could be decoded that far
    pub subject_id: Option<ItemId>,
    /// Topic the event arrived on
    pub topic: String,
    /// Raw payload, lossily decoded as UTF-8
    pub payload: String,
    /// Why the event was parked
    pub reason: String,
    /// Delivery attempts made before parking
    pub attempts: u32,
    /// When the event was parked
    pub parked_at: DateTime<Utc>,
}

/// Record of parked events, surfaced through health details.
pub trait DeadLetterStore: Send + Sync {
    /// Record a parked event.
    fn record(&self, event: ParkedEvent);

    /// Total events parked since startup.
    fn count(&self) -> u64;

    /// Most recent parked events, newest first.
    fn recent(&self, limit: usize) -> Vec<ParkedEvent>;
}

#[derive(Debug, Default)]
struct Ring {
    events: VecDeque<ParkedEvent>,
    total: u64,
}

/// Bounded in-memory [`DeadLetterStore`].
///
/// Keeps the newest `capacity` events; the total count keeps growing.
#[derive(Debug)]
pub struct InMemoryDeadLetterStore {
    capacity: usize,
    ring: Mutex<Ring>,
}

impl InMemoryDeadLetterStore {
    /// Create a store retaining at most `capacity` events (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ring: Mutex::new(Ring::default()),
        }
    }
}

impl Default for InMemoryDeadLetterStore {
    fn default() -> Self {
        Self::new(1_000)
    }
}

impl DeadLetterStore for InMemoryDeadLetterStore {
    fn record(&self, event: ParkedEvent) {
        let mut ring = self.ring.lock().unwrap_or_else(PoisonError::into_inner);
        if ring.events.len() == self.capacity {
            ring.events.pop_front();
        }
        ring.events.push_back(event);
        ring.total += 1;
    }

    fn count(&self) -> u64 {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner).total
    }

    fn recent(&self, limit: usize) -> Vec<ParkedEvent> {
        self.ring
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .events
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parked(reason: &str) -> ParkedEvent {
        ParkedEvent {
            subject_id: Some(ItemId::new("H1")),
            topic: "catalog.item-events".to_string(),
            payload: "{}".to_string(),
            reason: reason.to_string(),
            attempts: 5,
            parked_at: Utc::now(),
        }
    }

    #[test]
    fn keeps_newest_and_counts_all() {
        let store = InMemoryDeadLetterStore::new(2);
        store.record(parked("a"));
        store.record(parked("b"));
        store.record(parked("c"));

        assert_eq!(store.count(), 3);
        let recent: Vec<_> = store.recent(10).into_iter().map(|p| p.reason).collect();
        assert_eq!(recent, vec!["c", "b"]);
    }

    #[test]
    fn recent_respects_limit() {
        let store = InMemoryDeadLetterStore::default();
        store.record(parked("a"));
        store.record(parked("b"));

        assert_eq!(store.recent(1).len(), 1);
        assert_eq!(store.recent(1)[0].reason, "b");
    }
}
