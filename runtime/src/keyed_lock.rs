//! Single-writer-per-key async locking.
//!
//! Work on different keys proceeds in parallel; work on the same key is
//! serialized in lock-acquisition order. Entries are removed as soon as the
//! last holder or waiter for a key goes away, so the map only ever contains
//! keys with in-flight work.
//!
//! ```rust
//! use staysearch_runtime::keyed_lock::KeyedLock;
//!
//! # async fn example() {
//! let locks = KeyedLock::new();
//! let _guard = locks.lock(&"H1".to_string()).await;
//! // ... exclusive section for H1
//! # }
//! ```

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

type Slots<K> = Arc<Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>>;

/// Map of per-key async mutexes.
#[derive(Debug)]
pub struct KeyedLock<K>
where
    K: Eq + Hash + Clone,
{
    slots: Slots<K>,
}

impl<K> Default for KeyedLock<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> KeyedLock<K>
where
    K: Eq + Hash + Clone,
{
    /// Create an empty lock map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &K) -> KeyGuard<K> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(
                slots
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };

        let guard = slot.lock_owned().await;

        KeyGuard {
            key: key.clone(),
            guard: Some(guard),
            slots: Arc::clone(&self.slots),
        }
    }

    /// Number of keys with a holder or waiter.
    #[must_use]
    pub fn active_keys(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Exclusive access to one key, released on drop.
#[derive(Debug)]
pub struct KeyGuard<K>
where
    K: Eq + Hash + Clone,
{
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
    slots: Slots<K>,
}

impl<K> Drop for KeyGuard<K>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        // Release first so a waiter can proceed, then drop the slot if idle.
        drop(self.guard.take());

        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots
            .get(&self.key)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&self.key);
        }
    }
}
