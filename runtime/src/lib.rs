//! # StaySearch Runtime
//!
//! Resilience and concurrency building blocks shared by the ingestor and the
//! query path:
//!
//! - [`retry`]: exponential backoff with jitter for transient failures
//! - [`circuit_breaker`]: fail fast against a dependency that keeps failing
//! - [`keyed_lock`]: single-writer-per-key serialization
//! - [`fan_out`]: bounded-concurrency dispatch with a join barrier and
//!   cancellation on drop
//! - [`metrics`]: Prometheus recorder and typed metric helpers

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod circuit_breaker;
pub mod fan_out;
pub mod keyed_lock;
pub mod metrics;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
pub use fan_out::FanOut;
pub use keyed_lock::KeyedLock;
pub use retry::RetryPolicy;
