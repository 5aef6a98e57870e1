use staysearch_core::index::{IndexError, IndexStore, ScanFilter, Version, WriteOutcome};
use staysearch_core::item::{IndexedItem, ItemId};
use staysearch_core::BoxFuture;

/// [`IndexStore`] whose every operation fails with `Unavailable`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingIndexStore;

fn down<T>() -> Result<T, IndexError> {
    Err(IndexError::Unavailable("index offline".to_string()))
}

impl IndexStore for FailingIndexStore {
    fn upsert(&self, _item: IndexedItem, _version: Version) -> BoxFuture<'_, Result<WriteOutcome, IndexError>> {
        Box::pin(async { down() })
    }

    fn mark_inactive(&self, _id: &ItemId, _version: Version) -> BoxFuture<'_, Result<WriteOutcome, IndexError>> {
        Box::pin(async { down() })
    }

    fn get(&self, _id: &ItemId) -> BoxFuture<'_, Result<Option<IndexedItem>, IndexError>> {
        Box::pin(async { down() })
    }

    fn scan(&self, _filter: &ScanFilter) -> BoxFuture<'_, Result<Vec<IndexedItem>, IndexError>> {
        Box::pin(async { down() })
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), IndexError>> {
        Box::pin(async { down() })
    }
}
