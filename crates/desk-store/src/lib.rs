//! Persistent store capability for the desktop eventing core
//!
//! Both execution contexts (the diagnostic console and the main desktop) see
//! the same synchronous, string-keyed key/value store. It is the only thing
//! they share: every cross-context message travels through it.
//!
//! # Adapters
//!
//! - **MemoryStore**: ordered in-memory map, optional byte quota (tests, single process)
//! - **FileStore**: one JSON object file, rewritten atomically under a file lock (native, survives restarts)
//! - **LocalStore**: browser `localStorage` (feature `wasm`)
//!
//! # Atomicity
//!
//! [`PersistentStore::update`] is the read-modify-write primitive the command
//! queue relies on. The bundled adapters run the whole update under their own
//! lock; the provided default is a plain get-then-set for backends that cannot
//! do better.

use std::sync::Arc;

mod clock;
mod error;
#[cfg(not(target_arch = "wasm32"))]
mod file;
mod memory;

#[cfg(feature = "wasm")]
mod local;

pub use clock::wallclock_ms;
pub use error::StoreError;
#[cfg(not(target_arch = "wasm32"))]
pub use file::FileStore;
pub use memory::MemoryStore;

#[cfg(feature = "wasm")]
pub use local::LocalStore;

/// Shared handle to a store, injected into every component that persists.
pub type SharedStore = Arc<dyn PersistentStore>;

/// Synchronous key/value store shared between execution contexts.
///
/// Keys and values are plain strings. Implementations must be usable from any
/// thread of the hosting context.
pub trait PersistentStore: Send + Sync + 'static {
    /// Read the value stored under `key`.
    ///
    /// # Returns
    /// * `Ok(Some(value))` - Key present
    /// * `Ok(None)` - Key absent
    /// * `Err(StoreError)` - Backend failure
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    /// * `StoreError::QuotaExceeded` - Value does not fit
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// List every key currently stored, in ascending order.
    fn keys(&self) -> Result<Vec<String>, StoreError>;

    /// Atomically read, transform and write back the value under `key`.
    ///
    /// `f` receives the current value (or `None`) and returns the value to
    /// write, or `None` to leave the store untouched.
    ///
    /// # Returns
    /// * `Ok(true)` - A new value was written
    /// * `Ok(false)` - `f` declined to write
    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<&str>) -> Option<String>,
    ) -> Result<bool, StoreError> {
        let current = self.get(key)?;
        match f(current.as_deref()) {
            Some(next) => {
                self.set(key, &next)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// List the keys starting with `prefix`.
pub fn keys_with_prefix(store: &dyn PersistentStore, prefix: &str) -> Result<Vec<String>, StoreError> {
    Ok(store
        .keys()?
        .into_iter()
        .filter(|k| k.starts_with(prefix))
        .collect())
}
