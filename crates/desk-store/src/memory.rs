//! In-memory store.
//!
//! Provides a BTreeMap-based store that does not persist across restarts.
//! Used by tests and by single-process setups where both contexts live in
//! one host.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::{PersistentStore, StoreError};

/// In-memory store with an optional byte quota.
///
/// The quota counts key and value bytes, roughly what a browser counts for
/// `localStorage`. It exists so quota handling can be exercised without a
/// browser.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    entries: BTreeMap<String, String>,
    /// Maximum total bytes (None = unlimited)
    quota: Option<u64>,
    /// Number of successful set/remove calls
    writes: u64,
}

impl MemoryState {
    fn used_bytes(&self) -> u64 {
        self.entries
            .iter()
            .map(|(k, v)| (k.len() + v.len()) as u64)
            .sum()
    }

    /// Size the store would have after replacing `key` with `value`.
    fn size_after_set(&self, key: &str, value: &str) -> u64 {
        let existing = self
            .entries
            .get(key)
            .map(|v| (key.len() + v.len()) as u64)
            .unwrap_or(0);
        self.used_bytes() - existing + (key.len() + value.len()) as u64
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        if let Some(limit) = self.quota {
            let needed = self.size_after_set(key, value);
            if needed > limit {
                return Err(StoreError::quota_exceeded(needed, limit));
            }
        }
        self.entries.insert(key.to_string(), value.to_string());
        self.writes += 1;
        Ok(())
    }
}

impl MemoryStore {
    /// Create a new empty store without a quota.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that rejects writes growing it past `quota_bytes`.
    pub fn with_quota(quota_bytes: u64) -> Self {
        let store = Self::new();
        store.set_quota(Some(quota_bytes));
        store
    }

    /// Change the quota. `None` removes it.
    pub fn set_quota(&self, quota_bytes: Option<u64>) {
        self.lock().quota = quota_bytes;
    }

    /// Total key and value bytes currently held.
    pub fn used_bytes(&self) -> u64 {
        self.lock().used_bytes()
    }

    /// Number of successful writes (set and remove) so far.
    pub fn write_count(&self) -> u64 {
        self.lock().writes
    }

    /// Number of keys stored.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock cannot leave the map half-written:
        // every mutation is a single insert or remove.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl PersistentStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock().set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.entries.remove(key).is_some() {
            state.writes += 1;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock().entries.keys().cloned().collect())
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<&str>) -> Option<String>,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock();
        let next = f(state.entries.get(key).map(String::as_str));
        match next {
            Some(value) => {
                state.set(key, &value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
