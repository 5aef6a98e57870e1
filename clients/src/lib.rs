//! Network clients for the StaySearch dependencies.
//!
//! - [`HttpAvailabilityOracle`]: the availability oracle over HTTP, with an
//!   OAuth2 client-credentials [`CredentialCache`]
//! - [`HttpCatalogClient`]: point lookups against the catalog service
//! - [`RedisCacheBackend`]: Redis storage for the availability cache
//!
//! Each type implements the matching trait from `staysearch-core`, so the
//! engine only ever sees `Arc<dyn AvailabilityOracle>`,
//! `Arc<dyn CatalogClient>` and `Arc<dyn CacheBackend>`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod catalog;
pub mod credentials;
pub mod oracle;
pub mod redis_cache;

pub use catalog::HttpCatalogClient;
pub use credentials::{ClientCredentials, CredentialCache};
pub use oracle::HttpAvailabilityOracle;
pub use redis_cache::RedisCacheBackend;
