//! Key/value cache backend contract.
//!
//! The cache is an optimization only. Every caller must treat a
//! [`CacheError`] as a miss and carry on.

use crate::BoxFuture;
use std::time::Duration;
use thiserror::Error;

/// Errors from cache backends.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Backend unreachable
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    /// Stored value could not be encoded or decoded
    #[error("Cache serialization error: {0}")]
    Serialization(String),

    /// Backend reached but the command failed
    #[error("Cache backend error: {0}")]
    Backend(String),
}

/// Byte-oriented key/value store with per-entry TTL.
pub trait CacheBackend: Send + Sync {
    /// Read a value. Expired entries read as `None`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backend fails.
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<Vec<u8>>, CacheError>>;

    /// Write a value that expires after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backend fails.
    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> BoxFuture<'_, Result<(), CacheError>>;

    /// Liveness probe.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backend is not serving.
    fn ping(&self) -> BoxFuture<'_, Result<(), CacheError>>;

    /// Short backend name for logs and metric labels.
    fn name(&self) -> &'static str;
}
