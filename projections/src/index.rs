//! In-memory [`IndexStore`].
//!
//! One map entry per identifier holds the current document (if any) and the
//! version of the last applied write. Deleting an identifier that was never
//! indexed still records its tombstone version, so a late upsert carrying an
//! older timestamp cannot resurrect it.

use staysearch_core::index::{IndexError, IndexStore, ScanFilter, Version, WriteOutcome};
use staysearch_core::item::{IndexedItem, ItemId};
use staysearch_core::BoxFuture;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone)]
struct Entry {
    item: Option<IndexedItem>,
    version: Version,
}

/// Index backed by a `RwLock<HashMap>`.
///
/// Reads share the lock. Writes hold it for a single map update. The lock is
/// never held across an `.await`.
#[derive(Debug, Default)]
pub struct InMemoryIndexStore {
    entries: RwLock<HashMap<ItemId, Entry>>,
}

impl InMemoryIndexStore {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active documents.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Storage`] if the lock is poisoned.
    pub fn active_count(&self) -> Result<usize, IndexError> {
        Ok(self
            .read()?
            .values()
            .filter(|e| e.item.as_ref().is_some_and(|i| i.active))
            .count())
    }

    /// Version of the last write applied to `id`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Storage`] if the lock is poisoned.
    pub fn version_of(&self, id: &ItemId) -> Result<Option<Version>, IndexError> {
        Ok(self.read()?.get(id).map(|e| e.version))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<ItemId, Entry>>, IndexError> {
        self.entries
            .read()
            .map_err(|_| IndexError::Storage("index lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<ItemId, Entry>>, IndexError> {
        self.entries
            .write()
            .map_err(|_| IndexError::Storage("index lock poisoned".to_string()))
    }

    fn apply_upsert(&self, item: IndexedItem, version: Version) -> Result<WriteOutcome, IndexError> {
        let mut entries = self.write()?;

        if let Some(existing) = entries.get(&item.id) {
            if version < existing.version {
                tracing::debug!(
                    item_id = %item.id,
                    stored = %existing.version.timestamp,
                    incoming = %version.timestamp,
                    "Ignoring stale upsert"
                );
                return Ok(WriteOutcome::Stale);
            }
        }

        entries.insert(
            item.id.clone(),
            Entry {
                item: Some(item),
                version,
            },
        );
        Ok(WriteOutcome::Applied)
    }

    fn apply_mark_inactive(&self, id: &ItemId, version: Version) -> Result<WriteOutcome, IndexError> {
        let mut entries = self.write()?;

        match entries.get_mut(id) {
            Some(existing) if version < existing.version => Ok(WriteOutcome::Stale),
            Some(existing) => {
                existing.item = existing.item.take().map(IndexedItem::deactivated);
                existing.version = version;
                Ok(WriteOutcome::Applied)
            }
            None => {
                entries.insert(id.clone(), Entry { item: None, version });
                Ok(WriteOutcome::Applied)
            }
        }
    }
}

impl IndexStore for InMemoryIndexStore {
    fn upsert(&self, item: IndexedItem, version: Version) -> BoxFuture<'_, Result<WriteOutcome, IndexError>> {
        Box::pin(async move { self.apply_upsert(item, version) })
    }

    fn mark_inactive(&self, id: &ItemId, version: Version) -> BoxFuture<'_, Result<WriteOutcome, IndexError>> {
        let id = id.clone();
        Box::pin(async move { self.apply_mark_inactive(&id, version) })
    }

    fn get(&self, id: &ItemId) -> BoxFuture<'_, Result<Option<IndexedItem>, IndexError>> {
        let id = id.clone();
        Box::pin(async move { Ok(self.read()?.get(&id).and_then(|e| e.item.clone())) })
    }

    fn scan(&self, filter: &ScanFilter) -> BoxFuture<'_, Result<Vec<IndexedItem>, IndexError>> {
        let filter = filter.clone();
        Box::pin(async move {
            Ok(self
                .read()?
                .values()
                .filter_map(|e| e.item.as_ref())
                .filter(|item| filter.matches(item))
                .cloned()
                .collect())
        })
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), IndexError>> {
        Box::pin(async move { self.read().map(|_| ()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use staysearch_core::item::PriceBounds;
    use std::collections::BTreeSet;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn item(id: &str, name: &str, region: &str) -> IndexedItem {
        IndexedItem {
            id: ItemId::new(id),
            name: name.to_string(),
            description: String::new(),
            region: region.to_string(),
            address: String::new(),
            tags: BTreeSet::from(["pool".to_string()]),
            rating: 4.0,
            price: PriceBounds::default(),
            thumbnail: None,
            active: true,
        }
    }

    #[tokio::test]
    async fn newer_upsert_replaces_and_older_is_stale() {
        let store = InMemoryIndexStore::new();

        let first = store.upsert(item("H1", "Alpha", "X"), Version::updated(at(10))).await.unwrap();
        let older = store.upsert(item("H1", "Old", "X"), Version::updated(at(5))).await.unwrap();
        let newer = store.upsert(item("H1", "Beta", "X"), Version::updated(at(20))).await.unwrap();

        assert_eq!(first, WriteOutcome::Applied);
        assert_eq!(older, WriteOutcome::Stale);
        assert_eq!(newer, WriteOutcome::Applied);
        assert_eq!(store.get(&ItemId::new("H1")).await.unwrap().unwrap().name, "Beta");
    }

    #[tokio::test]
    async fn equal_version_is_reapplied() {
        let store = InMemoryIndexStore::new();
        store.upsert(item("H1", "Alpha", "X"), Version::updated(at(10))).await.unwrap();

        let again = store.upsert(item("H1", "Alpha", "X"), Version::updated(at(10))).await.unwrap();
        assert_eq!(again, WriteOutcome::Applied);
    }

    #[tokio::test]
    async fn inactive_items_are_readable_but_not_scanned() {
        let store = InMemoryIndexStore::new();
        store.upsert(item("H1", "Alpha", "X"), Version::updated(at(0))).await.unwrap();
        store.mark_inactive(&ItemId::new("H1"), Version::delete(at(1))).await.unwrap();

        let fetched = store.get(&ItemId::new("H1")).await.unwrap().unwrap();
        assert!(!fetched.active);
        assert!(store.scan(&ScanFilter::all()).await.unwrap().is_empty());
        assert_eq!(store.active_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_of_unknown_id_blocks_older_upsert() {
        let store = InMemoryIndexStore::new();
        let id = ItemId::new("H9");

        store.mark_inactive(&id, Version::delete(at(10))).await.unwrap();
        let late = store.upsert(item("H9", "Ghost", "X"), Version::updated(at(5))).await.unwrap();

        assert_eq!(late, WriteOutcome::Stale);
        assert!(store.get(&id).await.unwrap().is_none());
        assert_eq!(store.version_of(&id).unwrap(), Some(Version::delete(at(10))));
    }

    #[tokio::test]
    async fn delete_wins_timestamp_tie() {
        let store = InMemoryIndexStore::new();
        let id = ItemId::new("H1");

        store.mark_inactive(&id, Version::delete(at(10))).await.unwrap();
        let tie = store.upsert(item("H1", "Alpha", "X"), Version::updated(at(10))).await.unwrap();

        assert_eq!(tie, WriteOutcome::Stale);
    }

    #[tokio::test]
    async fn update_outranks_create_at_same_instant() {
        let store = InMemoryIndexStore::new();
        let id = ItemId::new("H1");

        store.upsert(item("H1", "Renamed", "X"), Version::updated(at(10))).await.unwrap();
        let create = store.upsert(item("H1", "Alpha", "X"), Version::created(at(10))).await.unwrap();

        assert_eq!(create, WriteOutcome::Stale);
        assert_eq!(store.get(&id).await.unwrap().unwrap().name, "Renamed");
    }

    #[tokio::test]
    async fn newer_upsert_reactivates() {
        let store = InMemoryIndexStore::new();
        let id = ItemId::new("H1");

        store.upsert(item("H1", "Alpha", "X"), Version::updated(at(0))).await.unwrap();
        store.mark_inactive(&id, Version::delete(at(1))).await.unwrap();
        store.upsert(item("H1", "Alpha", "X"), Version::updated(at(2))).await.unwrap();

        assert!(store.get(&id).await.unwrap().unwrap().active);
        assert_eq!(store.scan(&ScanFilter::all()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn scan_filters_text_and_region_case_insensitively() {
        let store = InMemoryIndexStore::new();
        store.upsert(item("H1", "Grand Alpha", "Lisbon"), Version::updated(at(0))).await.unwrap();
        store.upsert(item("H2", "Beta Inn", "Porto"), Version::updated(at(0))).await.unwrap();

        let by_text = store.scan(&ScanFilter::all().text("ALPHA")).await.unwrap();
        let by_region = store.scan(&ScanFilter::all().region("port")).await.unwrap();
        let by_tag = store.scan(&ScanFilter::all().text("Pool")).await.unwrap();

        assert_eq!(by_text.len(), 1);
        assert_eq!(by_text[0].id, ItemId::new("H1"));
        assert_eq!(by_region.len(), 1);
        assert_eq!(by_region[0].id, ItemId::new("H2"));
        assert_eq!(by_tag.len(), 2);
    }

    #[tokio::test]
    async fn ping_succeeds() {
        assert!(InMemoryIndexStore::new().ping().await.is_ok());
    }
}
