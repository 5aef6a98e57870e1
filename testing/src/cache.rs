use staysearch_core::cache::{CacheBackend, CacheError};
use staysearch_core::BoxFuture;
use std::time::Duration;

/// [`CacheBackend`] whose every operation fails with `Unavailable`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingCacheBackend;

fn down<T>() -> Result<T, CacheError> {
    Err(CacheError::Unavailable("cache offline".to_string()))
}

impl CacheBackend for FailingCacheBackend {
    fn get(&self, _key: &str) -> BoxFuture<'_, Result<Option<Vec<u8>>, CacheError>> {
        Box::pin(async { down() })
    }

    fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> BoxFuture<'_, Result<(), CacheError>> {
        Box::pin(async { down() })
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), CacheError>> {
        Box::pin(async { down() })
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}
