use std::sync::Arc;

use zstore_types::ContentKey;

use crate::error::LogResult;

/// Append-only, key-addressed log.
///
/// All implementations must satisfy these invariants:
/// - `append` is atomic: a concurrent or later `lookup` sees either the
///   previous value for the key or the new one, never a partial value.
/// - Last write wins: `lookup` returns the value of the most recent
///   `append` for the key.
/// - Earlier records are never modified; superseded values simply become
///   unreachable through `lookup`.
pub trait Log: Send + Sync {
    /// Append `value` as the latest record for `key`.
    fn append(&self, key: &ContentKey, value: &[u8]) -> LogResult<()>;

    /// Return the latest value appended for `key`.
    ///
    /// Returns `Ok(None)` if nothing was ever appended under `key`.
    fn lookup(&self, key: &ContentKey) -> LogResult<Option<Vec<u8>>>;

    /// Check whether any record exists for `key`.
    ///
    /// Default implementation reads the value. Backends with an index
    /// should override it.
    fn contains(&self, key: &ContentKey) -> LogResult<bool> {
        Ok(self.lookup(key)?.is_some())
    }

    /// Make every appended record durable.
    fn flush(&self) -> LogResult<()> {
        Ok(())
    }
}

impl<L: Log + ?Sized> Log for Arc<L> {
    fn append(&self, key: &ContentKey, value: &[u8]) -> LogResult<()> {
        (**self).append(key, value)
    }

    fn lookup(&self, key: &ContentKey) -> LogResult<Option<Vec<u8>>> {
        (**self).lookup(key)
    }

    fn contains(&self, key: &ContentKey) -> LogResult<bool> {
        (**self).contains(key)
    }

    fn flush(&self) -> LogResult<()> {
        (**self).flush()
    }
}
