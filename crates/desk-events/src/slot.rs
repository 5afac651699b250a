//! JSON value slot over the persistent store.
//!
//! A slot is one store key holding one serde value. It is the only way the
//! dispatcher and the queue touch the store, so encoding, corruption
//! detection and error classification live in one place.

use std::marker::PhantomData;

use desk_store::SharedStore;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::EventsError;

/// Decoder used when reading a slot.
pub(crate) type Decoder<T> = fn(&str) -> Result<T, serde_json::Error>;

/// Current content of a slot as seen by [`JsonSlot::update`].
pub(crate) enum Decoded<T> {
    /// Key absent
    Missing,
    /// Key present and parsed
    Value(T),
    /// Key present but unparsable
    Corrupt(serde_json::Error),
}

/// Typed view of a single store key.
pub(crate) struct JsonSlot<T> {
    store: SharedStore,
    key: String,
    decode: Decoder<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> JsonSlot<T> {
    /// Slot decoding with plain `serde_json::from_str`.
    pub(crate) fn new(store: SharedStore, key: impl Into<String>) -> Self {
        Self::with_decoder(store, key, |raw| serde_json::from_str(raw))
    }

    /// Slot with a custom decoder (used for layout migration).
    pub(crate) fn with_decoder(store: SharedStore, key: impl Into<String>, decode: Decoder<T>) -> Self {
        Self {
            store,
            key: key.into(),
            decode,
            _marker: PhantomData,
        }
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    /// Read and decode the slot.
    ///
    /// # Returns
    /// * `Ok(None)` - Key absent
    /// * `Err(EventsError::Corrupt)` - Stored text does not decode
    pub(crate) fn read(&self) -> Result<Option<T>, EventsError> {
        let raw = self
            .store
            .get(&self.key)
            .map_err(|e| EventsError::from_store(&self.key, e))?;
        match raw {
            Some(raw) => (self.decode)(&raw)
                .map(Some)
                .map_err(|source| EventsError::Corrupt {
                    key: self.key.clone(),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Replace the whole slot with `value`.
    pub(crate) fn write(&self, value: &T) -> Result<(), EventsError> {
        let json = self.encode(value)?;
        self.store
            .set(&self.key, &json)
            .map_err(|e| EventsError::from_store(&self.key, e))
    }

    /// Remove the key from the store.
    pub(crate) fn clear(&self) -> Result<(), EventsError> {
        self.store
            .remove(&self.key)
            .map_err(|e| EventsError::from_store(&self.key, e))
    }

    /// Atomic read-modify-write.
    ///
    /// `f` sees the decoded current value and returns the value to write
    /// (`None` leaves the store untouched) plus a result for the caller.
    pub(crate) fn update<R>(
        &self,
        mut f: impl FnMut(Decoded<T>) -> (Option<T>, R),
    ) -> Result<R, EventsError> {
        let mut outcome: Option<R> = None;
        let mut encode_error: Option<EventsError> = None;

        let result = self.store.update(&self.key, &mut |current| {
            let decoded = match current {
                None => Decoded::Missing,
                Some(raw) => match (self.decode)(raw) {
                    Ok(value) => Decoded::Value(value),
                    Err(e) => Decoded::Corrupt(e),
                },
            };
            let (next, r) = f(decoded);
            outcome = Some(r);
            match next {
                Some(value) => match self.encode(&value) {
                    Ok(json) => Some(json),
                    Err(e) => {
                        encode_error = Some(e);
                        None
                    }
                },
                None => None,
            }
        });

        result.map_err(|e| EventsError::from_store(&self.key, e))?;
        if let Some(e) = encode_error {
            return Err(e);
        }
        outcome.ok_or_else(|| {
            EventsError::from_store(
                &self.key,
                desk_store::StoreError::unavailable("store skipped the update callback"),
            )
        })
    }

    fn encode(&self, value: &T) -> Result<String, EventsError> {
        serde_json::to_string(value).map_err(|source| EventsError::Serialize {
            key: self.key.clone(),
            source,
        })
    }
}
