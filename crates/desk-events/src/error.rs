//! Error types for the eventing core.
//!
//! | Error | Taxonomy | Recovery |
//! |-------|----------|----------|
//! | `Corrupt` | SerializationError | owning structure reset to empty |
//! | `Serialize` | SerializationError | write skipped |
//! | `Capacity` | CapacityError | dispatcher persistence disabled |
//! | `Store` | backend failure | reported, in-memory state kept |
//! | `NoRuntime` | poller misuse | returned to the caller |
//!
//! Subscriber panics never become an `EventsError`; they are isolated and
//! logged where they happen.

use desk_store::StoreError;

/// Errors from the action dispatcher and the command queue.
#[derive(Debug, thiserror::Error)]
pub enum EventsError {
    /// Data stored under `key` could not be parsed.
    #[error("stored data under `{key}` is corrupt: {source}")]
    Corrupt {
        /// Store key holding the bad data
        key: String,
        /// Parse failure
        source: serde_json::Error,
    },

    /// A value could not be serialized for writing.
    #[error("could not serialize value for `{key}`: {source}")]
    Serialize {
        /// Store key that was being written
        key: String,
        /// Serialization failure
        source: serde_json::Error,
    },

    /// The store is full.
    #[error("store quota exceeded writing `{key}`: {source}")]
    Capacity {
        /// Store key that was being written
        key: String,
        /// Underlying quota error
        source: StoreError,
    },

    /// Any other store failure.
    #[error("store error on `{key}`: {source}")]
    Store {
        /// Store key being accessed
        key: String,
        /// Underlying store error
        source: StoreError,
    },

    /// `start_polling` was called outside a tokio runtime.
    #[error("no tokio runtime available to drive the command poller")]
    NoRuntime,
}

impl EventsError {
    /// Classify a store error for `key`: quota failures become `Capacity`.
    pub(crate) fn from_store(key: &str, source: StoreError) -> Self {
        if source.is_quota() {
            Self::Capacity {
                key: key.to_string(),
                source,
            }
        } else {
            Self::Store {
                key: key.to_string(),
                source,
            }
        }
    }

    /// Whether this is a SerializationError (stored or outgoing data).
    pub fn is_serialization(&self) -> bool {
        matches!(self, Self::Corrupt { .. } | Self::Serialize { .. })
    }

    /// Whether this is a CapacityError.
    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::Capacity { .. })
    }

    /// Store key involved, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Corrupt { key, .. }
            | Self::Serialize { key, .. }
            | Self::Capacity { key, .. }
            | Self::Store { key, .. } => Some(key),
            Self::NoRuntime => None,
        }
    }
}
