use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use zstore_types::ContentKey;

use crate::error::LogResult;
use crate::traits::Log;

/// In-memory, HashMap-based log.
///
/// Intended for tests and embedding. Only the latest value per key is
/// retained; appends that replace an existing value are counted as
/// superseded records so callers can observe rewrites.
pub struct MemoryLog {
    records: RwLock<HashMap<ContentKey, Vec<u8>>>,
    appended: AtomicU64,
    superseded: AtomicU64,
}

impl MemoryLog {
    /// Create a new empty log.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            appended: AtomicU64::new(0),
            superseded: AtomicU64::new(0),
        }
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.records.read().expect("lock poisoned").len()
    }

    /// Returns `true` if nothing was ever appended.
    pub fn is_empty(&self) -> bool {
        self.records.read().expect("lock poisoned").is_empty()
    }

    /// Total number of `append` calls, including ones that replaced a value.
    pub fn appended(&self) -> u64 {
        self.appended.load(Ordering::Relaxed)
    }

    /// Number of appends that replaced an existing value.
    pub fn superseded(&self) -> u64 {
        self.superseded.load(Ordering::Relaxed)
    }

}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Log for MemoryLog {
    fn append(&self, key: &ContentKey, value: &[u8]) -> LogResult<()> {
        let mut map = self.records.write().expect("lock poisoned");
        if map.insert(*key, value.to_vec()).is_some() {
            self.superseded.fetch_add(1, Ordering::Relaxed);
        }
        self.appended.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn lookup(&self, key: &ContentKey) -> LogResult<Option<Vec<u8>>> {
        let map = self.records.read().expect("lock poisoned");
        Ok(map.get(key).cloned())
    }

    fn contains(&self, key: &ContentKey) -> LogResult<bool> {
        let map = self.records.read().expect("lock poisoned");
        Ok(map.contains_key(key))
    }
}

impl std::fmt::Debug for MemoryLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLog")
            .field("keys", &self.len())
            .field("appended", &self.appended())
            .finish()
    }
}
