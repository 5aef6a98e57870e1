use staysearch_core::catalog::{CatalogClient, CatalogError, CatalogSnapshot};
use staysearch_core::item::ItemId;
use staysearch_core::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// In-memory [`CatalogClient`] with injectable failures.
#[derive(Debug, Default)]
pub struct StubCatalog {
    records: Mutex<HashMap<ItemId, CatalogSnapshot>>,
    failures: Mutex<HashMap<ItemId, (usize, CatalogError)>>,
    calls: AtomicUsize,
}

impl StubCatalog {
    /// Empty catalog; every fetch is `NotFound`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a record.
    #[must_use]
    pub fn with(self, id: &str, snapshot: CatalogSnapshot) -> Self {
        self.insert(id, snapshot);
        self
    }

    /// Add or replace a record while in use.
    pub fn insert(&self, id: &str, snapshot: CatalogSnapshot) {
        self.records.lock().unwrap().insert(ItemId::new(id), snapshot);
    }

    /// Fail the next `times` fetches of `id` with `error`.
    pub fn fail_next(&self, id: &str, times: usize, error: CatalogError) {
        self.failures
            .lock()
            .unwrap()
            .insert(ItemId::new(id), (times, error));
    }

    /// Total fetches.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_failure(&self, id: &ItemId) -> Option<CatalogError> {
        let mut failures = self.failures.lock().unwrap();
        let (remaining, error) = failures.get_mut(id)?;
        if *remaining == 0 {
            return None;
        }
        *remaining -= 1;
        Some(error.clone())
    }
}

impl CatalogClient for StubCatalog {
    fn fetch(&self, id: &ItemId) -> BoxFuture<'_, Result<CatalogSnapshot, CatalogError>> {
        let id = id.clone();
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if let Some(error) = self.next_failure(&id) {
                return Err(error);
            }

            self.records
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .ok_or(CatalogError::NotFound(id))
        })
    }
}
