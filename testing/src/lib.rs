//! # StaySearch Testing
//!
//! Test doubles and fixtures for the StaySearch crates.
//!
//! This crate provides:
//! - [`FixedClock`]: deterministic time
//! - [`StubOracle`]: scripted availability oracle with call counting
//! - [`StubCatalog`]: in-memory catalog with injectable failures
//! - [`InMemoryEventBus`]: event bus with redelivery on `Nack`
//! - [`FailingIndexStore`]: index that is always down
//! - [`FailingCacheBackend`]: cache that is always down
//! - [`fixtures`]: builders for items, snapshots, events and stays
//!
//! ## Example
//!
//! ```ignore
//! use staysearch_testing::{fixtures, StubOracle};
//!
//! #[tokio::test]
//! async fn counts_oracle_calls() {
//!     let oracle = StubOracle::new();
//!     let query = fixtures::query("H1", "2026-06-01", "2026-06-03", 2);
//!     oracle.quote(&query).await.unwrap();
//!     assert_eq!(oracle.calls(), 1);
//! }
//! ```

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::expect_used)]
#![allow(clippy::missing_panics_doc)]

mod cache;
mod catalog;
mod event_bus;
pub mod fixtures;
mod index;
mod oracle;

pub use cache::FailingCacheBackend;
pub use catalog::StubCatalog;
pub use event_bus::{InMemoryEventBus, ParkedMessage};
pub use index::FailingIndexStore;
pub use oracle::{StubBehavior, StubOracle};

use chrono::{DateTime, Utc};
use staysearch_core::environment::Clock;
use std::sync::Mutex;

/// Clock that only moves when told to.
///
/// # Example
///
/// ```
/// use staysearch_testing::FixedClock;
/// use staysearch_core::environment::Clock;
/// use chrono::Utc;
///
/// let clock = FixedClock::new(Utc::now());
/// assert_eq!(clock.now(), clock.now());
/// ```
#[derive(Debug)]
pub struct FixedClock {
    time: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Create a clock frozen at `time`.
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Mutex::new(time),
        }
    }

    /// Move the clock to `time`.
    pub fn set(&self, time: DateTime<Utc>) {
        *self.time.lock().unwrap() = time;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.time.lock().unwrap()
    }
}

/// Clock frozen at the fixture base time (2026-03-01 10:00:00 UTC).
#[must_use]
pub fn test_clock() -> FixedClock {
    FixedClock::new(fixtures::at(0))
}

/// Install a test tracing subscriber honoring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
