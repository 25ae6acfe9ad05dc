//! Cross-call cache of reconstructed contents.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use zstore_types::ContentKey;

/// LRU cache of full contents keyed by content key.
///
/// Content under a key never changes, so entries never go stale; a rebase
/// changes only how a key is stored, not what it resolves to.
pub struct ContentCache {
    inner: Mutex<LruCache<ContentKey, Vec<u8>>>,
    max_entry_bytes: usize,
}

impl ContentCache {
    /// Create a cache, or `None` when `capacity` is zero.
    pub fn new(capacity: usize, max_entry_bytes: usize) -> Option<Self> {
        let cap = NonZeroUsize::new(capacity)?;
        Some(Self {
            inner: Mutex::new(LruCache::new(cap)),
            max_entry_bytes,
        })
    }

    /// Get a cached content, promoting it to most-recently-used.
    pub fn get(&self, key: &ContentKey) -> Option<Vec<u8>> {
        self.inner.lock().expect("lock poisoned").get(key).cloned()
    }

    /// Insert a content unless it exceeds the per-entry limit.
    pub fn insert(&self, key: ContentKey, content: &[u8]) {
        if content.len() <= self.max_entry_bytes {
            self.inner
                .lock()
                .expect("lock poisoned")
                .put(key, content.to_vec());
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().expect("lock poisoned").clear();
    }
}

impl std::fmt::Debug for ContentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCache")
            .field("len", &self.len())
            .field("max_entry_bytes", &self.max_entry_bytes)
            .finish()
    }
}
