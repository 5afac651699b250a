//! Error types for the store layer.

/// Errors returned by a [`PersistentStore`](crate::PersistentStore).
///
/// Instead of collapsing every backend failure to a string, the variants keep
/// the failure mode so callers can tell a full store apart from a broken one.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The write would exceed the store's quota.
    ///
    /// `needed` is the total size the store would reach, `limit` the quota.
    /// Browser backends do not report sizes; both are zero there.
    #[error("storage quota exceeded ({needed} bytes needed, limit {limit})")]
    QuotaExceeded {
        /// Bytes the store would hold after the write
        needed: u64,
        /// Configured quota in bytes
        limit: u64,
    },

    /// Disk I/O failure in a file-backed store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing medium itself could not be parsed.
    ///
    /// This is about the container (e.g. the store file), not about a value
    /// stored under some key; values are opaque strings to the store.
    #[error("store backing data is corrupt: {0}")]
    Corrupt(String),

    /// The backend is not reachable (no window, storage disabled, lock poisoned).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Create a quota error.
    pub fn quota_exceeded(needed: u64, limit: u64) -> Self {
        Self::QuotaExceeded { needed, limit }
    }

    /// Create an unavailable error from any message.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Whether this error means the store is full.
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_classification() {
        assert!(StoreError::quota_exceeded(10, 5).is_quota());
        assert!(!StoreError::unavailable("no window").is_quota());
    }

    #[test]
    fn test_display_includes_sizes() {
        let err = StoreError::quota_exceeded(2048, 1024);
        let msg = err.to_string();
        assert!(msg.contains("2048"));
        assert!(msg.contains("1024"));
    }
}
