//! Opt-in simulated oracle for environments without oracle access.
//!
//! Every stay is reported bookable at a price derived from the party size.
//! Results carry [`Source::Simulated`], so the degradation policy never shows
//! them as confirmed.

use staysearch_core::availability::{AvailabilityOracle, AvailabilityQuery, OracleError, OracleQuote, Source};
use staysearch_core::BoxFuture;

/// Deterministic stand-in for the availability oracle.
#[derive(Debug, Clone)]
pub struct SimulatedOracle {
    base_price: f64,
    per_extra_guest: f64,
    currency: String,
}

impl Default for SimulatedOracle {
    fn default() -> Self {
        Self {
            base_price: 15_000.0,
            per_extra_guest: 5_000.0,
            currency: "ARS".to_string(),
        }
    }
}

impl SimulatedOracle {
    /// Simulated oracle quoting in `currency`.
    #[must_use]
    pub fn new(base_price: f64, per_extra_guest: f64, currency: impl Into<String>) -> Self {
        Self {
            base_price,
            per_extra_guest,
            currency: currency.into(),
        }
    }

    fn price_for(&self, guests: u32) -> f64 {
        self.base_price + f64::from(guests.saturating_sub(1)) * self.per_extra_guest
    }
}

impl AvailabilityOracle for SimulatedOracle {
    fn quote(&self, query: &AvailabilityQuery) -> BoxFuture<'_, Result<OracleQuote, OracleError>> {
        let quote = OracleQuote {
            available: true,
            offers: Some(5),
            price: Some(self.price_for(query.guests)),
            currency: Some(self.currency.clone()),
        };
        Box::pin(async move { Ok(quote) })
    }

    fn source(&self) -> Source {
        Source::Simulated
    }
}
