//! Catalog change events.
//!
//! One canonical envelope, validated once at the boundary:
//!
//! ```json
//! { "kind": "updated", "subject_id": "H1", "snapshot": { ... }, "timestamp": "2026-03-01T10:00:00Z" }
//! ```
//!
//! The snapshot is optional. An absent, `null` or empty-object snapshot marks a
//! thin notification; consumers pull the full state from the catalog.
//!
//! Legacy envelopes (`type`, `hotel_id`, `hotel`, `hotel.created`, ...) decode
//! into the same type.

use crate::catalog::{CatalogSnapshot, SnapshotError};
use crate::index::Version;
use crate::item::ItemId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// What happened to the subject.
///
/// Variants are declared in tie-break order for [`Version`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Record created
    #[serde(alias = "hotel.created")]
    Created,
    /// Record updated
    #[serde(alias = "hotel.updated")]
    Updated,
    /// Record deleted
    #[serde(alias = "hotel.deleted")]
    Deleted,
}

impl ChangeKind {
    /// Stable lowercase name, used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while decoding an inbound event.
///
/// None of these are retryable: redelivering the same bytes cannot fix them.
#[derive(Error, Debug, Clone)]
pub enum EventError {
    /// Payload is not a well-formed envelope
    #[error("Malformed event payload: {0}")]
    Malformed(String),

    /// Envelope has an empty subject identifier
    #[error("Event has a blank subject identifier")]
    BlankSubject,

    /// Embedded snapshot failed validation
    #[error("Invalid snapshot for {subject}: {source}")]
    InvalidSnapshot {
        /// Subject identifier
        subject: ItemId,
        /// Validation failure
        #[source]
        source: SnapshotError,
    },
}

/// Validated catalog change notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    /// What happened
    pub kind: ChangeKind,
    /// Identifier of the changed record
    pub subject_id: ItemId,
    /// Full state, if the producer embedded it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<CatalogSnapshot>,
    /// When the change happened at the source
    pub timestamp: DateTime<Utc>,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(alias = "type")]
    kind: ChangeKind,
    #[serde(alias = "hotel_id")]
    subject_id: String,
    #[serde(default, alias = "hotel")]
    snapshot: Option<serde_json::Value>,
    timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    /// Build a thin event without a snapshot.
    #[must_use]
    pub fn thin(kind: ChangeKind, subject_id: impl Into<ItemId>, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            subject_id: subject_id.into(),
            snapshot: None,
            timestamp,
        }
    }

    /// Attach a snapshot.
    #[must_use]
    pub fn with_snapshot(mut self, snapshot: CatalogSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// Decode and validate an event from its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`EventError`] if the bytes are not a valid envelope, the
    /// subject is blank, or the snapshot fails validation.
    pub fn decode(payload: &[u8]) -> Result<Self, EventError> {
        let envelope: Envelope =
            serde_json::from_slice(payload).map_err(|e| EventError::Malformed(e.to_string()))?;

        let subject_id = ItemId::new(envelope.subject_id);
        if subject_id.is_blank() {
            return Err(EventError::BlankSubject);
        }

        let snapshot = match envelope.snapshot {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::Object(map)) if map.is_empty() => None,
            Some(value) => Some(
                serde_json::from_value::<CatalogSnapshot>(value)
                    .map_err(|e| EventError::Malformed(format!("snapshot: {e}")))?,
            ),
        };

        // Deletes carry no state worth validating
        if envelope.kind != ChangeKind::Deleted {
            if let Some(snapshot) = &snapshot {
                snapshot
                    .validate(&subject_id)
                    .map_err(|source| EventError::InvalidSnapshot {
                        subject: subject_id.clone(),
                        source,
                    })?;
            }
        }

        Ok(Self {
            kind: envelope.kind,
            subject_id,
            snapshot,
            timestamp: envelope.timestamp,
        })
    }

    /// Encode the canonical JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Malformed`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(|e| EventError::Malformed(e.to_string()))
    }

    /// Ordering position of this event for its subject.
    #[must_use]
    pub const fn version(&self) -> Version {
        Version::new(self.timestamp, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn decodes_canonical_envelope_with_snapshot() {
        let payload = br#"{
            "kind": "created",
            "subject_id": "H1",
            "snapshot": { "name": "Alpha", "region": "X", "rating": 4.0 },
            "timestamp": "2026-03-01T10:00:00Z"
        }"#;

        let event = ChangeEvent::decode(payload).unwrap();
        assert_eq!(event.kind, ChangeKind::Created);
        assert_eq!(event.subject_id, ItemId::new("H1"));
        assert_eq!(event.snapshot.unwrap().name, "Alpha");
    }

    #[test]
    fn empty_snapshot_is_a_thin_event() {
        let payload = br#"{"kind":"updated","subject_id":"H1","snapshot":{},"timestamp":"2026-03-01T10:00:00Z"}"#;
        let event = ChangeEvent::decode(payload).unwrap();
        assert!(event.snapshot.is_none());
    }

    #[test]
    fn decodes_legacy_producer_envelope() {
        let payload = br#"{"type":"hotel.updated","hotel_id":"65f0c","timestamp":"2026-03-01T10:00:00.123456789-03:00"}"#;
        let event = ChangeEvent::decode(payload).unwrap();
        assert_eq!(event.kind, ChangeKind::Updated);
        assert_eq!(event.subject_id.as_str(), "65f0c");
        assert_eq!(
            event.timestamp,
            Utc.with_ymd_and_hms(2026, 3, 1, 13, 0, 0).unwrap()
                + chrono::Duration::nanoseconds(123_456_789)
        );
    }

    #[test]
    fn blank_subject_is_rejected() {
        let payload = br#"{"kind":"deleted","subject_id":" ","timestamp":"2026-03-01T10:00:00Z"}"#;
        assert!(matches!(ChangeEvent::decode(payload), Err(EventError::BlankSubject)));
    }

    #[test]
    fn invalid_snapshot_is_rejected() {
        let payload = br#"{"kind":"created","subject_id":"H1","snapshot":{"name":"A","rating":9},"timestamp":"2026-03-01T10:00:00Z"}"#;
        assert!(matches!(
            ChangeEvent::decode(payload),
            Err(EventError::InvalidSnapshot { .. })
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(ChangeEvent::decode(b"not json"), Err(EventError::Malformed(_))));
    }

    #[test]
    fn encode_decode_preserves_event() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        let event = ChangeEvent::thin(ChangeKind::Deleted, "H1", ts);
        let decoded = ChangeEvent::decode(&event.encode().unwrap()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn delete_outranks_update_at_the_same_instant() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        let update = ChangeEvent::thin(ChangeKind::Updated, "H1", ts);
        let delete = ChangeEvent::thin(ChangeKind::Deleted, "H1", ts);
        assert!(delete.version() > update.version());
    }
}
