//! Index maintenance for StaySearch.
//!
//! # Overview
//!
//! This crate keeps the denormalized search index in step with the catalog:
//! - **[`InMemoryIndexStore`]**: versioned, last-write-wins document store
//! - **[`EventIngestor`]**: consumes change events, resolves thin events
//!   through the catalog and writes the index
//! - **[`DeadLetterStore`]**: records events the ingestor gave up on
//!
//! ```text
//! catalog.item-events ──► EventIngestor ──► InMemoryIndexStore
//!                              │
//!                              └── parked ──► DeadLetterStore
//! ```

pub mod dead_letter;
pub mod index;
pub mod ingestor;

pub use dead_letter::{DeadLetterStore, InMemoryDeadLetterStore, ParkedEvent};
pub use index::InMemoryIndexStore;
pub use ingestor::{EventIngestor, IngestConfig, IngestError, IngestOutcome};
