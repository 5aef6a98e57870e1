//! Indexed catalog items.
//!
//! An [`IndexedItem`] is the denormalized copy of a catalog record held by the
//! index. Its display fields are copies, never authoritative; the catalog
//! service owns the record. The identifier is assigned by the catalog and is
//! stable across updates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Globally unique, origin-assigned item identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Create an identifier from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the identifier is empty or whitespace only.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Nightly price range advertised by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBounds {
    /// Lowest advertised nightly price
    pub min: f64,
    /// Highest advertised nightly price
    pub max: f64,
    /// ISO 4217 currency code
    pub currency: String,
}

impl Default for PriceBounds {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 0.0,
            currency: "USD".to_string(),
        }
    }
}

/// Denormalized, queryable copy of a catalog record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedItem {
    /// Stable identifier
    pub id: ItemId,
    /// Display name
    pub name: String,
    /// Free-text description
    pub description: String,
    /// Region (city) the item belongs to
    pub region: String,
    /// Street address
    pub address: String,
    /// Amenity tags
    pub tags: BTreeSet<String>,
    /// Rating between 0.0 and 5.0
    pub rating: f64,
    /// Advertised price bounds
    pub price: PriceBounds,
    /// Thumbnail reference
    pub thumbnail: Option<String>,
    /// `false` once a delete has been applied
    pub active: bool,
}

impl IndexedItem {
    /// Case-insensitive substring match on name, description and tags.
    ///
    /// `needle` must already be lowercased.
    #[must_use]
    pub fn matches_text(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
            || self.tags.iter().any(|tag| tag.to_lowercase().contains(needle))
    }

    /// Case-insensitive substring match on region.
    ///
    /// `needle` must already be lowercased.
    #[must_use]
    pub fn matches_region(&self, needle: &str) -> bool {
        self.region.to_lowercase().contains(needle)
    }

    /// Copy of this item flagged inactive.
    #[must_use]
    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> IndexedItem {
        IndexedItem {
            id: ItemId::new("H1"),
            name: "Alpha Lodge".to_string(),
            description: "Quiet rooms near the lake".to_string(),
            region: "Bariloche".to_string(),
            address: "Av. Costanera 1".to_string(),
            tags: ["Spa".to_string(), "wifi".to_string()].into_iter().collect(),
            rating: 4.0,
            price: PriceBounds::default(),
            thumbnail: None,
            active: true,
        }
    }

    #[test]
    fn text_match_covers_name_description_and_tags() {
        let item = item();
        assert!(item.matches_text("alpha"));
        assert!(item.matches_text("lake"));
        assert!(item.matches_text("spa"));
        assert!(!item.matches_text("beach"));
    }

    #[test]
    fn region_match_is_case_insensitive_substring() {
        let item = item();
        assert!(item.matches_region("bari"));
        assert!(!item.matches_region("mendoza"));
    }

    #[test]
    fn item_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&ItemId::new("H7")).unwrap_or_default();
        assert_eq!(json, "\"H7\"");
    }

    #[test]
    fn blank_ids_are_detected() {
        assert!(ItemId::new("  ").is_blank());
        assert!(!ItemId::new("H1").is_blank());
    }
}
