//! Builders for domain values used across test suites.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use staysearch_core::availability::{AvailabilityQuery, OracleQuote, StayDates};
use staysearch_core::catalog::{CatalogSnapshot, SnapshotPrice};
use staysearch_core::event::{ChangeEvent, ChangeKind};
use staysearch_core::item::{IndexedItem, ItemId, PriceBounds};
use std::collections::BTreeSet;

/// Fixture base time plus `secs` seconds.
#[must_use]
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap() + Duration::seconds(secs)
}

/// Valid snapshot for `id`.
#[must_use]
pub fn snapshot(id: &str, name: &str, region: &str, rating: f64) -> CatalogSnapshot {
    CatalogSnapshot {
        id: Some(ItemId::new(id)),
        name: name.to_string(),
        description: format!("{name} in {region}"),
        region: region.to_string(),
        address: "1 Main Street".to_string(),
        tags: BTreeSet::from(["wifi".to_string()]),
        rating,
        price: SnapshotPrice {
            min: 80.0,
            max: 160.0,
            currency: "EUR".to_string(),
        },
        thumbnail: None,
        active: true,
    }
}

/// Active indexed item.
#[must_use]
pub fn item(id: &str, name: &str, region: &str, rating: f64) -> IndexedItem {
    IndexedItem {
        id: ItemId::new(id),
        name: name.to_string(),
        description: format!("{name} in {region}"),
        region: region.to_string(),
        address: "1 Main Street".to_string(),
        tags: BTreeSet::from(["wifi".to_string()]),
        rating,
        price: PriceBounds {
            min: 80.0,
            max: 160.0,
            currency: "EUR".to_string(),
        },
        thumbnail: None,
        active: true,
    }
}

/// `created` event carrying a snapshot, at [`at`]`(secs)`.
#[must_use]
pub fn created(snapshot: CatalogSnapshot, secs: i64) -> ChangeEvent {
    with_snapshot(ChangeKind::Created, snapshot, secs)
}

/// `updated` event carrying a snapshot, at [`at`]`(secs)`.
#[must_use]
pub fn updated(snapshot: CatalogSnapshot, secs: i64) -> ChangeEvent {
    with_snapshot(ChangeKind::Updated, snapshot, secs)
}

/// `deleted` event for `id`, at [`at`]`(secs)`.
#[must_use]
pub fn deleted(id: &str, secs: i64) -> ChangeEvent {
    ChangeEvent::thin(ChangeKind::Deleted, id, at(secs))
}

/// Event without a snapshot.
#[must_use]
pub fn thin(kind: ChangeKind, id: &str, secs: i64) -> ChangeEvent {
    ChangeEvent::thin(kind, id, at(secs))
}

fn with_snapshot(kind: ChangeKind, snapshot: CatalogSnapshot, secs: i64) -> ChangeEvent {
    let id = snapshot.id.clone().unwrap_or_else(|| ItemId::new("unknown"));
    ChangeEvent::thin(kind, id, at(secs)).with_snapshot(snapshot)
}

/// Stay from ISO dates.
#[must_use]
pub fn stay(check_in: &str, check_out: &str) -> StayDates {
    StayDates::new(date(check_in), date(check_out)).unwrap()
}

/// Availability query from ISO dates.
#[must_use]
pub fn query(id: &str, check_in: &str, check_out: &str, guests: u32) -> AvailabilityQuery {
    AvailabilityQuery::new(ItemId::new(id), stay(check_in, check_out), guests).unwrap()
}

/// Bookable quote.
#[must_use]
pub fn available_quote(price: f64) -> OracleQuote {
    OracleQuote {
        available: true,
        offers: Some(1),
        price: Some(price),
        currency: Some("EUR".to_string()),
    }
}

/// Sold-out quote.
#[must_use]
pub fn sold_out_quote() -> OracleQuote {
    OracleQuote {
        available: false,
        offers: Some(0),
        price: None,
        currency: None,
    }
}

fn date(iso: &str) -> NaiveDate {
    NaiveDate::parse_from_str(iso, "%Y-%m-%d").unwrap()
}
