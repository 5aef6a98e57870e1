//! Index store contract.
//!
//! The index holds one document per identifier. Writes are ordered by a
//! caller-supplied [`Version`], never by arrival order, so replays and
//! out-of-order deliveries converge on the same state.
//!
//! Deletes are logical: the document stays readable through [`IndexStore::get`]
//! but disappears from [`IndexStore::scan`].

use crate::event::ChangeKind;
use crate::item::{IndexedItem, ItemId};
use crate::BoxFuture;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Position of a write in the per-identifier history.
///
/// Ordered by timestamp, then by change kind (`Created < Updated < Deleted`).
/// Two distinct changes to one identifier therefore never share a version
/// unless they are the same kind at the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    /// Source timestamp of the change
    pub timestamp: DateTime<Utc>,
    /// Kind of change, the tie-breaker between equal timestamps
    pub kind: ChangeKind,
}

impl Version {
    /// Create a version.
    #[must_use]
    pub const fn new(timestamp: DateTime<Utc>, kind: ChangeKind) -> Self {
        Self { timestamp, kind }
    }

    /// Version of a creation at `timestamp`.
    #[must_use]
    pub const fn created(timestamp: DateTime<Utc>) -> Self {
        Self::new(timestamp, ChangeKind::Created)
    }

    /// Version of an update at `timestamp`.
    #[must_use]
    pub const fn updated(timestamp: DateTime<Utc>) -> Self {
        Self::new(timestamp, ChangeKind::Updated)
    }

    /// Version of a delete at `timestamp`.
    #[must_use]
    pub const fn delete(timestamp: DateTime<Utc>) -> Self {
        Self::new(timestamp, ChangeKind::Deleted)
    }

    /// Whether this version records a delete.
    #[must_use]
    pub const fn is_delete(&self) -> bool {
        matches!(self.kind, ChangeKind::Deleted)
    }
}

/// Result of a versioned write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write was applied (or re-applied with an equal version)
    Applied,
    /// A newer version is already stored; nothing changed
    Stale,
}

/// Errors from index operations.
#[derive(Error, Debug, Clone)]
pub enum IndexError {
    /// Backend cannot be reached
    #[error("Index unavailable: {0}")]
    Unavailable(String),

    /// Backend reached but the operation failed
    #[error("Index storage error: {0}")]
    Storage(String),
}

/// Text and region filters for [`IndexStore::scan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanFilter {
    text: Option<String>,
    region: Option<String>,
}

impl ScanFilter {
    /// Filter matching every active item.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            text: None,
            region: None,
        }
    }

    /// Restrict to items whose name, description or tags contain `text`.
    ///
    /// Blank input is ignored.
    #[must_use]
    pub fn text(mut self, text: impl AsRef<str>) -> Self {
        self.text = normalize(text.as_ref());
        self
    }

    /// Restrict to items whose region contains `region`.
    ///
    /// Blank input is ignored.
    #[must_use]
    pub fn region(mut self, region: impl AsRef<str>) -> Self {
        self.region = normalize(region.as_ref());
        self
    }

    /// Whether `item` passes the filter. Inactive items never pass.
    #[must_use]
    pub fn matches(&self, item: &IndexedItem) -> bool {
        item.active
            && self.text.as_deref().is_none_or(|t| item.matches_text(t))
            && self.region.as_deref().is_none_or(|r| item.matches_region(r))
    }
}

fn normalize(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
}

/// Denormalized, read-mostly document store.
///
/// Implementations must let reads proceed concurrently and must never hold a
/// lock across an `.await`.
pub trait IndexStore: Send + Sync {
    /// Replace the document for `item.id` if `version` is not older than the
    /// stored one.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] if the backend fails. Callers treat this as
    /// retryable.
    fn upsert(&self, item: IndexedItem, version: Version) -> BoxFuture<'_, Result<WriteOutcome, IndexError>>;

    /// Flag the document inactive if `version` is not older than the stored
    /// one. Unknown identifiers record a tombstone.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] if the backend fails.
    fn mark_inactive(&self, id: &ItemId, version: Version) -> BoxFuture<'_, Result<WriteOutcome, IndexError>>;

    /// Point read, including inactive documents.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] if the backend fails.
    fn get(&self, id: &ItemId) -> BoxFuture<'_, Result<Option<IndexedItem>, IndexError>>;

    /// Active documents matching `filter`, in unspecified order.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] if the backend fails. Callers treat this as a
    /// hard failure of the request.
    fn scan(&self, filter: &ScanFilter) -> BoxFuture<'_, Result<Vec<IndexedItem>, IndexError>>;

    /// Liveness probe used by health reporting.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] if the backend is not serving.
    fn ping(&self) -> BoxFuture<'_, Result<(), IndexError>>;
}
