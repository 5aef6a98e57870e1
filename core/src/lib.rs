//! # StaySearch Core
//!
//! Domain types and dependency traits shared by every StaySearch crate.
//!
//! The engine keeps a denormalized index of catalog items eventually
//! consistent with an upstream catalog, and merges it with live availability
//! from an external oracle at query time.
//!
//! ## Core Concepts
//!
//! - **[`item::IndexedItem`]**: Denormalized, queryable copy of a catalog record
//! - **[`event::ChangeEvent`]**: Canonical change notification emitted by the catalog
//! - **[`availability::AvailabilityResult`]**: Tri-state answer for one item and stay
//! - **Dependency traits**: [`index::IndexStore`], [`catalog::CatalogClient`],
//!   [`availability::AvailabilityOracle`], [`cache::CacheBackend`], [`event_bus::EventBus`]
//!
//! ## Data Flow
//!
//! ```text
//! Catalog change ──► EventBus ──► Ingestor ──► IndexStore
//!                                                  │
//! Search query ──► Aggregator ─── scan ────────────┘
//!                      │
//!                      └── fan-out ──► Cache ──► Oracle
//! ```
//!
//! All traits that cross an I/O boundary return boxed futures so they can be
//! held as `Arc<dyn Trait>` by the runtime and the HTTP layer.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

// Re-export commonly used types
pub use chrono::{DateTime, NaiveDate, Utc};
pub use serde::{Deserialize, Serialize};

pub mod availability;
pub mod cache;
pub mod catalog;
pub mod event;
pub mod event_bus;
pub mod index;
pub mod item;

/// Boxed future returned by the dyn-compatible dependency traits.
pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Environment module - injected time source.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
