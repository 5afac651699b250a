//! Browser `localStorage` adapter.
//!
//! `localStorage` is shared by every tab of the same origin and survives
//! reloads, which is exactly the cross-context medium the eventing core
//! needs in the browser. The storage object is looked up on every call, so
//! the adapter holds no JS handles and stays `Send + Sync`.
//!
//! A browser tab is single-threaded, so the provided get-then-set
//! [`PersistentStore::update`] cannot interleave with another call in the
//! same tab.

use wasm_bindgen::{JsCast, JsValue};

use crate::{PersistentStore, StoreError};

/// `localStorage`-backed store.
#[derive(Debug, Default)]
pub struct LocalStore {
    _private: (),
}

impl LocalStore {
    /// Create a handle to the current window's `localStorage`.
    pub fn new() -> Self {
        Self::default()
    }

    fn storage(&self) -> Result<web_sys::Storage, StoreError> {
        let window = web_sys::window().ok_or_else(|| StoreError::unavailable("no window"))?;
        window
            .local_storage()
            .map_err(|e| StoreError::unavailable(describe(&e)))?
            .ok_or_else(|| StoreError::unavailable("localStorage disabled"))
    }
}

/// Map a thrown JS value to a store error.
fn map_js_error(err: JsValue) -> StoreError {
    if let Some(dom) = err.dyn_ref::<web_sys::DomException>() {
        if dom.name() == "QuotaExceededError" {
            return StoreError::quota_exceeded(0, 0);
        }
    }
    StoreError::unavailable(describe(&err))
}

fn describe(err: &JsValue) -> String {
    err.as_string().unwrap_or_else(|| format!("{:?}", err))
}

impl PersistentStore for LocalStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.storage()?.get_item(key).map_err(map_js_error)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.storage()?.set_item(key, value).map_err(|e| {
            let err = map_js_error(e);
            web_sys::console::warn_1(&format!("[store] localStorage write failed for {}: {}", key, err).into());
            err
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.storage()?.remove_item(key).map_err(map_js_error)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let storage = self.storage()?;
        let len = storage.length().map_err(map_js_error)?;
        let mut keys = Vec::with_capacity(len as usize);
        for i in 0..len {
            if let Some(key) = storage.key(i).map_err(map_js_error)? {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
