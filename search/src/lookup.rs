//! Point lookup of a single item with a cold fallback to the catalog.

use chrono::{DateTime, Utc};
use staysearch_core::catalog::{CatalogClient, CatalogError, SnapshotError};
use staysearch_core::index::{IndexError, IndexStore, Version, WriteOutcome};
use staysearch_core::item::{IndexedItem, ItemId};
use std::sync::Arc;
use thiserror::Error;

/// Lookup failures. A missing item is `Ok(None)`, not an error.
#[derive(Error, Debug)]
pub enum LookupError {
    /// Index read or write failed
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Catalog could not be queried
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Catalog answered with a record that fails validation
    #[error("Catalog record for {id} is invalid: {source}")]
    InvalidRecord {
        /// Requested item
        id: ItemId,
        /// Validation failure
        source: SnapshotError,
    },
}

/// Finds items in the index, fetching unknown ones from the catalog.
pub struct ItemLookup {
    index: Arc<dyn IndexStore>,
    catalog: Arc<dyn CatalogClient>,
}

impl ItemLookup {
    /// Create a lookup over `index` and `catalog`.
    #[must_use]
    pub fn new(index: Arc<dyn IndexStore>, catalog: Arc<dyn CatalogClient>) -> Self {
        Self { index, catalog }
    }

    /// Active item with `id`, if any.
    ///
    /// On an index miss the record is fetched from the catalog and upserted
    /// with the oldest possible version, so any change event for the item,
    /// already applied or still in flight, takes precedence over it.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError`] if the index fails, the catalog fails with
    /// anything other than "not found", or the record is invalid.
    pub async fn find(&self, id: &ItemId) -> Result<Option<IndexedItem>, LookupError> {
        if let Some(item) = self.index.get(id).await? {
            return Ok(item.active.then_some(item));
        }

        let snapshot = match self.catalog.fetch(id).await {
            Ok(snapshot) => snapshot,
            Err(CatalogError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        snapshot
            .validate(id)
            .map_err(|source| LookupError::InvalidRecord {
                id: id.clone(),
                source,
            })?;

        let item = snapshot.into_item(id.clone());
        match self.index.upsert(item.clone(), Version::created(DateTime::<Utc>::MIN_UTC)).await? {
            WriteOutcome::Applied => {
                tracing::info!(item_id = %id, "Indexed item from cold catalog lookup");
                Ok(item.active.then_some(item))
            }
            WriteOutcome::Stale => Ok(self.index.get(id).await?.filter(|item| item.active)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use staysearch_projections::InMemoryIndexStore;
    use staysearch_testing::{fixtures, StubCatalog};

    #[tokio::test]
    async fn indexed_item_is_returned_without_catalog_call() {
        let index = Arc::new(InMemoryIndexStore::new());
        index
            .upsert(fixtures::item("H1", "Alpha", "X", 4.0), Version::updated(fixtures::at(0)))
            .await
            .unwrap();
        let catalog = Arc::new(StubCatalog::new());
        let lookup = ItemLookup::new(index, catalog.clone());

        assert!(lookup.find(&ItemId::new("H1")).await.unwrap().is_some());
        assert_eq!(catalog.calls(), 0);
    }

    #[tokio::test]
    async fn miss_is_filled_from_catalog() {
        let index = Arc::new(InMemoryIndexStore::new());
        let catalog = Arc::new(StubCatalog::new().with("H7", fixtures::snapshot("H7", "Cold", "Y", 3.0)));
        let lookup = ItemLookup::new(index.clone(), catalog);

        let item = lookup.find(&ItemId::new("H7")).await.unwrap().unwrap();

        assert_eq!(item.name, "Cold");
        assert!(index.get(&ItemId::new("H7")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn later_event_overrides_cold_lookup() {
        let index = Arc::new(InMemoryIndexStore::new());
        let catalog = Arc::new(StubCatalog::new().with("H7", fixtures::snapshot("H7", "Cold", "Y", 3.0)));
        let lookup = ItemLookup::new(index.clone(), catalog);
        lookup.find(&ItemId::new("H7")).await.unwrap();

        let outcome = index
            .upsert(fixtures::item("H7", "Fresh", "Y", 3.0), Version::updated(fixtures::at(0)))
            .await
            .unwrap();

        assert_eq!(outcome, WriteOutcome::Applied);
    }

    #[tokio::test]
    async fn deleted_item_is_not_resurrected() {
        let index = Arc::new(InMemoryIndexStore::new());
        index
            .mark_inactive(&ItemId::new("H7"), Version::delete(fixtures::at(0)))
            .await
            .unwrap();
        let catalog = Arc::new(StubCatalog::new().with("H7", fixtures::snapshot("H7", "Ghost", "Y", 3.0)));
        let lookup = ItemLookup::new(index, catalog);

        assert!(lookup.find(&ItemId::new("H7")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_everywhere_is_none() {
        let lookup = ItemLookup::new(Arc::new(InMemoryIndexStore::new()), Arc::new(StubCatalog::new()));
        assert!(lookup.find(&ItemId::new("H404")).await.unwrap().is_none());
    }
}
