//! Redis-backed availability cache storage.
//!
//! Values are opaque bytes written with `PSETEX`, so Redis expires entries on
//! its own and the millisecond TTLs of negative results are honored. All keys
//! live under the `staysearch:` namespace.
//!
//! # Performance
//!
//! - **Connection reuse**: a single `ConnectionManager` is cloned per command
//!   and reconnects on its own after a broken connection
//! - **Single round-trip** per get or set

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use staysearch_core::cache::{CacheBackend, CacheError};
use staysearch_core::BoxFuture;
use std::time::Duration;

const KEY_PREFIX: &str = "staysearch:";

/// [`CacheBackend`] storing entries in Redis.
#[derive(Clone)]
pub struct RedisCacheBackend {
    conn_manager: ConnectionManager,
}

impl RedisCacheBackend {
    /// Connect to `redis_url` (for example `redis://127.0.0.1:6379`).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if the URL is malformed or the
    /// server cannot be reached.
    pub async fn new(redis_url: &str) -> Result<Self, CacheError> {
        let client = Client::open(redis_url)
            .map_err(|e| CacheError::Unavailable(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            CacheError::Unavailable(format!("Failed to create Redis connection manager: {e}"))
        })?;

        tracing::info!("RedisCacheBackend initialized successfully");

        Ok(Self { conn_manager })
    }

    fn namespaced(key: &str) -> String {
        format!("{KEY_PREFIX}{key}")
    }
}

fn command_error(err: &redis::RedisError) -> CacheError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
        CacheError::Unavailable(err.to_string())
    } else {
        CacheError::Backend(err.to_string())
    }
}

impl CacheBackend for RedisCacheBackend {
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<Vec<u8>>, CacheError>> {
        let key = Self::namespaced(key);
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let value: Option<Vec<u8>> = conn.get(&key).await.map_err(|e| command_error(&e))?;
            Ok(value)
        })
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> BoxFuture<'_, Result<(), CacheError>> {
        let key = Self::namespaced(key);
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
            let _: () = conn
                .pset_ex(&key, value, ttl_ms)
                .await
                .map_err(|e| command_error(&e))?;
            Ok(())
        })
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), CacheError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let _: String = redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(|e| command_error(&e))?;
            Ok(())
        })
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(
            RedisCacheBackend::namespaced("availability:H1:2026-05-01:2026-05-04:2"),
            "staysearch:availability:H1:2026-05-01:2026-05-04:2"
        );
    }

    #[tokio::test]
    async fn malformed_url_is_unavailable() {
        let err = RedisCacheBackend::new("not a url").await.err();
        assert!(matches!(err, Some(CacheError::Unavailable(_))));
    }
}
