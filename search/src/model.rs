//! Search request and response shapes.

use crate::policy::Confidence;
use serde::Serialize;
use staysearch_core::availability::{Source, StayDates};
use staysearch_core::item::IndexedItem;

/// Default page size.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Largest accepted page size.
pub const MAX_PAGE_SIZE: u32 = 100;

/// A validated search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Free text matched against name, description and tags
    pub text: Option<String>,
    /// Region substring
    pub region: Option<String>,
    /// Stay to check availability for; `None` skips the oracle
    pub stay: Option<StayDates>,
    /// Party size
    pub guests: u32,
    /// 1-based page number
    pub page: u32,
    /// Items per page
    pub page_size: u32,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            text: None,
            region: None,
            stay: None,
            guests: 1,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl SearchRequest {
    /// Search with defaults and no filters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by free text.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Filter by region.
    #[must_use]
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Check availability for `stay`.
    #[must_use]
    pub const fn stay(mut self, stay: StayDates) -> Self {
        self.stay = Some(stay);
        self
    }

    /// Party size.
    #[must_use]
    pub const fn guests(mut self, guests: u32) -> Self {
        self.guests = guests;
        self
    }

    /// Page and page size.
    #[must_use]
    pub const fn page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }
}

/// Availability annotation of one returned item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityStatus {
    /// No dates were given; the item is assumed bookable
    NotChecked,
    /// Confirmed by the oracle
    Confirmed,
    /// Simulated, shown only because simulated results are allowed
    Unconfirmed,
}

impl From<Confidence> for AvailabilityStatus {
    fn from(confidence: Confidence) -> Self {
        match confidence {
            Confidence::Confirmed => Self::Confirmed,
            Confidence::Unconfirmed => Self::Unconfirmed,
        }
    }
}

/// Availability block of a [`SearchHit`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemAvailability {
    /// Confidence of the annotation
    pub status: AvailabilityStatus,
    /// Price for the stay
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// Currency of `price`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// Where the answer came from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
}

impl ItemAvailability {
    /// Annotation for searches without dates.
    #[must_use]
    pub const fn not_checked() -> Self {
        Self {
            status: AvailabilityStatus::NotChecked,
            price: None,
            currency: None,
            source: None,
        }
    }
}

/// One returned item: the indexed document plus its availability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// Indexed document
    #[serde(flatten)]
    pub item: IndexedItem,
    /// Availability annotation
    pub availability: ItemAvailability,
}

/// Outcome counts across every candidate of a search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AvailabilitySummary {
    /// Whether availability was checked at all
    pub checked: bool,
    /// Candidates confirmed available
    pub confirmed: usize,
    /// Candidates the oracle reported unavailable
    pub unavailable: usize,
    /// Candidates without a trustworthy answer
    pub unknown: usize,
    /// Candidates answered by a simulated oracle
    pub simulated: usize,
}

/// A page of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    /// Items on this page
    pub items: Vec<SearchHit>,
    /// Items across all pages
    pub total: usize,
    /// 1-based page number
    pub page: u32,
    /// Requested page size
    pub page_size: u32,
    /// Number of pages
    pub total_pages: u32,
    /// Availability counts
    pub availability: AvailabilitySummary,
    /// Whether some answers could not be obtained
    pub degraded: bool,
    /// Explanations for a degraded answer
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notices: Vec<String>,
}
