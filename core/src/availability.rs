//! Availability queries, results and the oracle contract.
//!
//! The oracle is an external system answering "is this item free for this
//! stay". Its answer is normalized into a tri-state [`Outcome`]; `Unknown` is
//! never silently promoted to `Available`.

use crate::item::ItemId;
use crate::BoxFuture;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Validation failures for stay parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StayError {
    /// Check-out is on or before check-in
    #[error("check-out {check_out} must be after check-in {check_in}")]
    EmptyStay {
        /// Requested check-in
        check_in: NaiveDate,
        /// Requested check-out
        check_out: NaiveDate,
    },

    /// Party size below one
    #[error("guests must be a positive integer")]
    NoGuests,
}

/// Check-in / check-out pair with `check_out > check_in`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StayDates {
    check_in: NaiveDate,
    check_out: NaiveDate,
}

impl StayDates {
    /// Create a stay.
    ///
    /// # Errors
    ///
    /// Returns [`StayError::EmptyStay`] unless `check_out` is strictly after
    /// `check_in`.
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Result<Self, StayError> {
        if check_out <= check_in {
            return Err(StayError::EmptyStay {
                check_in,
                check_out,
            });
        }
        Ok(Self {
            check_in,
            check_out,
        })
    }

    /// Arrival date.
    #[must_use]
    pub const fn check_in(&self) -> NaiveDate {
        self.check_in
    }

    /// Departure date.
    #[must_use]
    pub const fn check_out(&self) -> NaiveDate {
        self.check_out
    }

    /// Number of nights in the stay.
    #[must_use]
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }
}

/// One availability question: item, stay and party size.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AvailabilityQuery {
    /// Item being checked
    pub item_id: ItemId,
    /// Requested stay
    pub stay: StayDates,
    /// Party size, at least one
    pub guests: u32,
}

impl AvailabilityQuery {
    /// Create a query.
    ///
    /// # Errors
    ///
    /// Returns [`StayError::NoGuests`] when `guests` is zero.
    pub fn new(item_id: ItemId, stay: StayDates, guests: u32) -> Result<Self, StayError> {
        if guests == 0 {
            return Err(StayError::NoGuests);
        }
        Ok(Self {
            item_id,
            stay,
            guests,
        })
    }

    /// Exact cache key for this query.
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!(
            "availability:{}:{}:{}:{}",
            self.item_id, self.stay.check_in, self.stay.check_out, self.guests
        )
    }
}

/// Tri-state availability outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Bookable for the stay
    Available,
    /// Not bookable for the stay
    Unavailable,
    /// No trustworthy answer (timeout, error, open circuit)
    Unknown,
}

impl Outcome {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Unavailable => "unavailable",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Fresh oracle answer
    Oracle,
    /// Served from the availability cache
    Cache,
    /// Produced by a simulated oracle; never a confirmation
    Simulated,
}

impl Source {
    /// Stable lowercase name, used as a metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Oracle => "oracle",
            Self::Cache => "cache",
            Self::Simulated => "simulated",
        }
    }
}

/// Normalized answer for one [`AvailabilityQuery`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityResult {
    /// The question this answers
    pub query: AvailabilityQuery,
    /// Tri-state outcome
    pub outcome: Outcome,
    /// Total price for the stay, when available
    pub price: Option<f64>,
    /// Currency of `price`
    pub currency: Option<String>,
    /// Provenance
    pub source: Source,
}

impl AvailabilityResult {
    /// Result with no trustworthy answer.
    #[must_use]
    pub const fn unknown(query: AvailabilityQuery, source: Source) -> Self {
        Self {
            query,
            outcome: Outcome::Unknown,
            price: None,
            currency: None,
            source,
        }
    }

    /// Normalize an oracle quote.
    ///
    /// Zero offers or `available == false` is `Unavailable` with no price. A
    /// bookable quote without a finite, non-negative price and a currency is
    /// malformed and becomes `Unknown`.
    #[must_use]
    pub fn from_quote(query: AvailabilityQuery, quote: OracleQuote, source: Source) -> Self {
        let bookable = quote.available && quote.offers.is_none_or(|n| n > 0);
        if !bookable {
            return Self {
                query,
                outcome: Outcome::Unavailable,
                price: None,
                currency: None,
                source,
            };
        }

        let price = quote.price.filter(|p| p.is_finite() && *p >= 0.0);
        let currency = quote.currency.filter(|c| !c.trim().is_empty());
        match (price, currency) {
            (Some(price), Some(currency)) => Self {
                query,
                outcome: Outcome::Available,
                price: Some(price),
                currency: Some(currency),
                source,
            },
            _ => Self::unknown(query, source),
        }
    }

    /// Same result with a different provenance tag.
    #[must_use]
    pub fn with_source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }
}

/// Raw oracle answer before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleQuote {
    /// Availability flag as reported
    pub available: bool,
    /// Number of offers, when the oracle reports it
    #[serde(default)]
    pub offers: Option<u32>,
    /// Price
    #[serde(default)]
    pub price: Option<f64>,
    /// Currency
    #[serde(default)]
    pub currency: Option<String>,
}

/// Errors from the availability oracle.
#[derive(Error, Debug, Clone)]
pub enum OracleError {
    /// Call exceeded its deadline
    #[error("Oracle call timed out")]
    Timeout,

    /// Oracle rejected our credentials
    #[error("Oracle rejected credentials: {0}")]
    Unauthorized(String),

    /// Token endpoint unreachable or misconfigured
    #[error("Oracle credentials unavailable: {0}")]
    CredentialsUnavailable(String),

    /// Non-success HTTP status
    #[error("Oracle returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// Body could not be decoded
    #[error("Malformed oracle response: {0}")]
    Malformed(String),

    /// Network or connection failure
    #[error("Oracle transport error: {0}")]
    Transport(String),
}

impl OracleError {
    /// Whether the failure is in the authentication layer rather than a
    /// single lookup.
    #[must_use]
    pub const fn is_credential_failure(&self) -> bool {
        matches!(self, Self::Unauthorized(_) | Self::CredentialsUnavailable(_))
    }
}

/// External availability oracle.
pub trait AvailabilityOracle: Send + Sync {
    /// Ask the oracle about one query.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError`] on timeout, transport failure, non-success
    /// status or malformed body.
    fn quote(&self, query: &AvailabilityQuery) -> BoxFuture<'_, Result<OracleQuote, OracleError>>;

    /// Make sure credentials are usable before a batch of lookups.
    ///
    /// # Errors
    ///
    /// Returns a credential failure when the authentication layer is down.
    fn ensure_ready(&self) -> BoxFuture<'_, Result<(), OracleError>> {
        Box::pin(async { Ok(()) })
    }

    /// Provenance tag for results produced by this oracle.
    fn source(&self) -> Source {
        Source::Oracle
    }
}
