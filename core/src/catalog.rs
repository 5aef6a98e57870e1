//! Catalog service contract.
//!
//! The catalog owns the authoritative records. The engine only reads from it,
//! either through snapshots embedded in change events or through a point
//! lookup by identifier when the event is a thin notification.
//!
//! [`CatalogSnapshot`] is the single canonical record schema shared by event
//! payloads and the point lookup. Older producers used different field names
//! (`city`, `amenities`, `price_range.min_price`, `is_active`); those are
//! accepted as aliases when decoding, and nowhere else.

use crate::item::{IndexedItem, ItemId, PriceBounds};
use crate::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Full state of a catalog record at some point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    /// Identifier, when the producer embeds it
    #[serde(default)]
    pub id: Option<ItemId>,
    /// Display name
    pub name: String,
    /// Free-text description
    #[serde(default)]
    pub description: String,
    /// Region (city)
    #[serde(default, alias = "city")]
    pub region: String,
    /// Street address
    #[serde(default)]
    pub address: String,
    /// Amenity tags
    #[serde(default, alias = "amenities")]
    pub tags: BTreeSet<String>,
    /// Rating between 0.0 and 5.0
    #[serde(default)]
    pub rating: f64,
    /// Advertised price bounds
    #[serde(default, alias = "price_range")]
    pub price: SnapshotPrice,
    /// Thumbnail reference
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Whether the record is bookable in the catalog
    #[serde(default = "default_active", alias = "is_active")]
    pub active: bool,
}

const fn default_active() -> bool {
    true
}

/// Wire form of [`PriceBounds`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPrice {
    /// Lowest nightly price
    #[serde(default, alias = "min_price")]
    pub min: f64,
    /// Highest nightly price
    #[serde(default, alias = "max_price")]
    pub max: f64,
    /// ISO 4217 currency code
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Default for SnapshotPrice {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 0.0,
            currency: default_currency(),
        }
    }
}

/// Reasons a snapshot is rejected at the boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// Snapshot names a different record than the event
    #[error("Snapshot id '{found}' does not match subject '{expected}'")]
    IdMismatch {
        /// Subject identifier of the envelope
        expected: String,
        /// Identifier found in the snapshot
        found: String,
    },

    /// A field failed validation
    #[error("Invalid snapshot field '{field}': {reason}")]
    InvalidField {
        /// Offending field
        field: &'static str,
        /// What was wrong with it
        reason: String,
    },
}

impl CatalogSnapshot {
    /// Validate the snapshot against the subject it describes.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] when the embedded id disagrees with
    /// `subject`, the name is blank, the rating is outside `0.0..=5.0`, the
    /// price bounds are inverted or negative, or the currency is not a
    /// three-letter code.
    pub fn validate(&self, subject: &ItemId) -> Result<(), SnapshotError> {
        if let Some(id) = &self.id {
            if id != subject {
                return Err(SnapshotError::IdMismatch {
                    expected: subject.to_string(),
                    found: id.to_string(),
                });
            }
        }
        if self.name.trim().is_empty() {
            return Err(invalid("name", "must not be blank"));
        }
        if !self.rating.is_finite() || !(0.0..=5.0).contains(&self.rating) {
            return Err(invalid("rating", format!("{} is outside 0..=5", self.rating)));
        }
        if !self.price.min.is_finite() || !self.price.max.is_finite() || self.price.min < 0.0 {
            return Err(invalid("price", "bounds must be finite and non-negative"));
        }
        if self.price.min > self.price.max {
            return Err(invalid(
                "price",
                format!("min {} exceeds max {}", self.price.min, self.price.max),
            ));
        }
        let currency = &self.price.currency;
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(invalid("currency", format!("'{currency}' is not an ISO 4217 code")));
        }
        Ok(())
    }

    /// Convert into an indexed document for `id`.
    #[must_use]
    pub fn into_item(self, id: ItemId) -> IndexedItem {
        IndexedItem {
            id,
            name: self.name,
            description: self.description,
            region: self.region,
            address: self.address,
            tags: self.tags,
            rating: self.rating,
            price: PriceBounds {
                min: self.price.min,
                max: self.price.max,
                currency: self.price.currency.to_ascii_uppercase(),
            },
            thumbnail: self.thumbnail.filter(|t| !t.trim().is_empty()),
            active: self.active,
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> SnapshotError {
    SnapshotError::InvalidField {
        field,
        reason: reason.into(),
    }
}

/// Errors from the catalog point lookup.
#[derive(Error, Debug, Clone)]
pub enum CatalogError {
    /// The catalog has no record with this identifier
    #[error("Catalog record not found: {0}")]
    NotFound(ItemId),

    /// Non-success HTTP status
    #[error("Catalog returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// Response body could not be decoded into a snapshot
    #[error("Malformed catalog response: {0}")]
    Malformed(String),

    /// Network or connection failure
    #[error("Catalog transport error: {0}")]
    Transport(String),
}

impl CatalogError {
    /// Whether retrying the same lookup shortly may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::NotFound(_) | Self::Malformed(_) => false,
        }
    }
}

/// Point lookup against the catalog service.
///
/// Implementations clone what they need before the returned future so the
/// future only borrows `self`.
pub trait CatalogClient: Send + Sync {
    /// Fetch the current snapshot of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on any non-200 answer, malformed body or
    /// transport failure.
    fn fetch(&self, id: &ItemId) -> BoxFuture<'_, Result<CatalogSnapshot, CatalogError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> CatalogSnapshot {
        serde_json::from_value(serde_json::json!({
            "name": "Alpha",
            "region": "X",
            "rating": 4.0,
        }))
        .unwrap()
    }

    #[test]
    fn minimal_snapshot_uses_defaults() {
        let snap = snapshot();
        assert!(snap.active);
        assert_eq!(snap.price.currency, "USD");
        assert!(snap.validate(&ItemId::new("H1")).is_ok());
    }

    #[test]
    fn legacy_field_names_decode_into_canonical_fields() {
        let snap: CatalogSnapshot = serde_json::from_value(serde_json::json!({
            "id": "H9",
            "name": "Hotel Sur",
            "city": "Mendoza",
            "amenities": ["pool", "wifi"],
            "rating": 3.5,
            "price_range": { "min_price": 80.0, "max_price": 120.0, "currency": "ars" },
            "thumbnail": "",
            "is_active": false
        }))
        .unwrap();

        assert_eq!(snap.region, "Mendoza");
        assert_eq!(snap.tags.len(), 2);
        assert!(!snap.active);

        let item = snap.into_item(ItemId::new("H9"));
        assert_eq!(item.price.currency, "ARS");
        assert_eq!(item.thumbnail, None);
    }

    #[test]
    fn mismatched_id_is_rejected() {
        let mut snap = snapshot();
        snap.id = Some(ItemId::new("H2"));
        assert!(matches!(
            snap.validate(&ItemId::new("H1")),
            Err(SnapshotError::IdMismatch { .. })
        ));
    }

    #[test]
    fn out_of_range_rating_is_rejected() {
        let mut snap = snapshot();
        snap.rating = 7.0;
        assert!(snap.validate(&ItemId::new("H1")).is_err());
    }

    #[test]
    fn inverted_price_bounds_are_rejected() {
        let mut snap = snapshot();
        snap.price.min = 200.0;
        snap.price.max = 100.0;
        assert!(snap.validate(&ItemId::new("H1")).is_err());
    }

    #[test]
    fn transient_classification() {
        assert!(CatalogError::Transport("reset".into()).is_transient());
        assert!(CatalogError::Status { status: 503, body: String::new() }.is_transient());
        assert!(!CatalogError::NotFound(ItemId::new("H1")).is_transient());
        assert!(!CatalogError::Malformed("eof".into()).is_transient());
    }
}
