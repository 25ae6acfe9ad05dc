use std::fmt;
use std::path::Path;

use tracing::{debug, info, warn};
use zstore_delta::{DeltaCodec, ZstdDeltaCodec};
use zstore_log::{FileLog, FileLogConfig, Log};
use zstore_types::ContentKey;

use crate::cache::ContentCache;
use crate::config::StoreConfig;
use crate::entry::Entry;
use crate::error::{StoreError, StoreResult};
use crate::planner::{WritePlan, WritePlanner};
use crate::resolver::{ChainInfo, ChainLink, ChainResolver};

/// What a `put` did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PutReport {
    pub key: ContentKey,
    pub plan: WritePlan,
    /// Encoded entry bytes appended; `0` when the key already existed.
    pub stored_bytes: usize,
}

/// Outcome of a rebase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebaseOutcome {
    /// Nothing was written; the entry already sits at `depth`.
    Unchanged { depth: u32 },
    /// A new representation was appended for the key.
    Rebased {
        from_depth: u32,
        to_depth: u32,
        base: Option<ContentKey>,
    },
}

/// Delta-chained content-addressed store over a [`Log`].
///
/// Safe to share across threads. Racing puts of the same content each
/// append a valid entry for it, and the log keeps the last; readers never
/// block each other.
pub struct Store<L, C = ZstdDeltaCodec> {
    log: L,
    codec: C,
    config: StoreConfig,
    cache: Option<ContentCache>,
}

impl<L: Log> Store<L> {
    /// Open a store over `log` with the zstd codec at the configured level.
    pub fn open(config: StoreConfig, log: L) -> StoreResult<Self> {
        let codec = ZstdDeltaCodec::new(config.compression_level);
        Self::with_codec(config, log, codec)
    }
}

impl Store<FileLog> {
    /// Open (or create) a store backed by a single log file.
    pub fn open_file(
        path: &Path,
        config: StoreConfig,
        log_config: FileLogConfig,
    ) -> StoreResult<Self> {
        let log = FileLog::open(path, log_config).map_err(StoreError::Log)?;
        Self::open(config, log)
    }
}

impl<L: Log, C: DeltaCodec> Store<L, C> {
    /// Open a store with a caller-supplied codec.
    pub fn with_codec(config: StoreConfig, log: L, codec: C) -> StoreResult<Self> {
        config.validate()?;
        let cache = ContentCache::new(config.cache_capacity, config.cache_max_entry_bytes);
        debug!(
            max_chain_depth = config.max_chain_depth,
            max_chain_bytes = config.max_chain_bytes,
            cache = cache.is_some(),
            "store opened"
        );
        Ok(Self {
            log,
            codec,
            config,
            cache,
        })
    }

    fn resolver(&self) -> ChainResolver<'_, L, C> {
        ChainResolver::new(&self.log, &self.codec).with_cache(self.cache.as_ref())
    }

    fn append(&self, key: &ContentKey, entry: &Entry) -> StoreResult<usize> {
        let bytes = entry.encode();
        self.log
            .append(key, &bytes)
            .map_err(|source| StoreError::StorageWriteFailed { key: *key, source })?;
        Ok(bytes.len())
    }

    fn remember(&self, key: ContentKey, content: &[u8]) {
        if let Some(cache) = &self.cache {
            cache.insert(key, content);
        }
    }

    // ---- Writes ----

    /// Store `content`, diffing against `base_hint` when that pays off.
    ///
    /// Storing a content that is already present appends nothing.
    pub fn put(&self, content: &[u8], base_hint: Option<&ContentKey>) -> StoreResult<ContentKey> {
        self.put_with_report(content, base_hint).map(|r| r.key)
    }

    /// Like [`put`](Self::put), also reporting how the content was stored.
    pub fn put_with_report(
        &self,
        content: &[u8],
        base_hint: Option<&ContentKey>,
    ) -> StoreResult<PutReport> {
        let planner = WritePlanner::new(self.resolver(), &self.codec, &self.config);
        let planned = planner.plan(content, base_hint)?;

        let stored_bytes = match &planned.entry {
            Some(entry) => self.append(&planned.key, entry)?,
            None => 0,
        };
        self.remember(planned.key, content);

        debug!(
            key = %planned.key.short_hex(),
            plan = ?planned.plan,
            content_bytes = content.len(),
            stored_bytes,
            "put"
        );
        Ok(PutReport {
            key: planned.key,
            plan: planned.plan,
            stored_bytes,
        })
    }

    // ---- Reads ----

    /// Reconstruct the content stored under `key`.
    pub fn get(&self, key: &ContentKey) -> StoreResult<Vec<u8>> {
        let content = self.resolver().resolve(key)?;
        self.remember(*key, &content);
        Ok(content)
    }

    /// Reconstruct several keys, decoding shared chain members once.
    pub fn get_many(&self, keys: &[ContentKey]) -> StoreResult<Vec<Vec<u8>>> {
        let contents = self.resolver().resolve_many(keys)?;
        for (key, content) in keys.iter().zip(&contents) {
            self.remember(*key, content);
        }
        Ok(contents)
    }

    pub fn contains(&self, key: &ContentKey) -> StoreResult<bool> {
        self.resolver().contains(key)
    }

    pub fn chain_info(&self, key: &ContentKey) -> StoreResult<ChainInfo> {
        self.resolver().chain_info(key)
    }

    pub fn chain_depth(&self, key: &ContentKey) -> StoreResult<u32> {
        self.resolver().chain_depth(key)
    }

    pub fn chain_cumulative_size(&self, key: &ContentKey) -> StoreResult<u64> {
        self.resolver().chain_cumulative_size(key)
    }

    /// Every hop from `key` down to its snapshot, nearest first.
    pub fn delta_chain(&self, key: &ContentKey) -> StoreResult<Vec<ChainLink>> {
        self.resolver().delta_chain(key)
    }

    // ---- Maintenance ----

    /// Rewrite `key` as a snapshot, or as a delta against `new_base`.
    ///
    /// A delta is only written when `new_base` sits strictly shallower than
    /// the key's current depth minus one; otherwise, and whenever the delta
    /// would not be smaller, the key is rewritten as a snapshot. The old
    /// representation stays in the log, superseded.
    pub fn rebase(
        &self,
        key: &ContentKey,
        new_base: Option<&ContentKey>,
    ) -> StoreResult<RebaseOutcome> {
        let resolver = self.resolver();
        let current = resolver.load(key)?.ok_or(StoreError::KeyNotFound(*key))?;
        if current.is_snapshot() {
            return Ok(RebaseOutcome::Unchanged { depth: 0 });
        }
        let from_depth = current.depth();

        let base_entry = match new_base {
            Some(base) if base == key => {
                return Err(StoreError::InvalidRebase {
                    key: *key,
                    reason: "cannot rebase onto itself".into(),
                });
            }
            Some(base) => {
                let entry = resolver.load(base)?.ok_or_else(|| StoreError::InvalidRebase {
                    key: *key,
                    reason: format!("base {} is not stored", base.short_hex()),
                })?;
                Some((*base, entry))
            }
            None => None,
        };

        let content = resolver.resolve(key)?;
        let snapshot = Entry::snapshot(self.codec.compress(&content)?);
        let entry = match base_entry {
            Some((base, base_entry)) => {
                let depth = base_entry.depth().saturating_add(1);
                if depth < from_depth {
                    self.rebased_delta(key, &content, base, depth, snapshot)?
                } else {
                    debug!(
                        key = %key.short_hex(),
                        base = %base.short_hex(),
                        depth,
                        from_depth,
                        "rebase target too deep, writing snapshot"
                    );
                    snapshot
                }
            }
            None => snapshot,
        };

        self.append(key, &entry)?;
        let outcome = RebaseOutcome::Rebased {
            from_depth,
            to_depth: entry.depth(),
            base: entry.kind.base(),
        };
        info!(key = %key.short_hex(), ?outcome, "rebased");
        Ok(outcome)
    }

    fn rebased_delta(
        &self,
        key: &ContentKey,
        content: &[u8],
        base: ContentKey,
        depth: u32,
        snapshot: Entry,
    ) -> StoreResult<Entry> {
        let base_content = self.resolver().resolve(&base)?;
        match self.codec.diff(&base_content, content) {
            Ok(delta) if delta.len() < snapshot.payload.len() => {
                Ok(Entry::delta(base, depth, delta))
            }
            Ok(_) => Ok(snapshot),
            Err(e) => {
                warn!(
                    key = %key.short_hex(),
                    base = %base.short_hex(),
                    error = %e,
                    "diff failed during rebase"
                );
                Ok(snapshot)
            }
        }
    }

    /// Rebase `key` to a snapshot if its chain breaks either configured bound.
    ///
    /// Entries written under looser settings stay readable; this brings
    /// them back within the current ones.
    pub fn rebase_if_needed(&self, key: &ContentKey) -> StoreResult<RebaseOutcome> {
        let info = self.chain_info(key)?;
        if info.depth > self.config.max_chain_depth
            || info.cumulative_size > self.config.max_chain_bytes
        {
            self.rebase(key, None)
        } else {
            Ok(RebaseOutcome::Unchanged { depth: info.depth })
        }
    }

    /// Make every appended entry durable.
    pub fn flush(&self) -> StoreResult<()> {
        self.log.flush().map_err(StoreError::Log)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// The cross-call content cache, if enabled.
    pub fn cache(&self) -> Option<&ContentCache> {
        self.cache.as_ref()
    }
}

impl<L, C> fmt::Debug for Store<L, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;
    use std::thread;

    use proptest::prelude::*;
    use zstore_delta::CodecResult;
    use zstore_log::{LogError, LogResult, MemoryLog};

    use super::*;
    use crate::planner::SnapshotReason;

    fn noise(seed: u64, len: usize) -> Vec<u8> {
        let mut state = seed | 1;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                state as u8
            })
            .collect()
    }

    fn memory_store(config: StoreConfig) -> Store<MemoryLog> {
        Store::open(config, MemoryLog::new()).unwrap()
    }

    /// 32,000 bytes, and a copy with one 10,000-byte region rewritten.
    fn scenario_pair() -> (Vec<u8>, Vec<u8>) {
        let a = noise(7, 32_000);
        let mut b = a.clone();
        let region = b"the second revision rewrote this region. ".repeat(250);
        b[10_000..20_000].copy_from_slice(&region[..10_000]);
        (a, b)
    }

    /// Snapshot, then `len - 1` deltas each appending a line to the last.
    fn build_chain<L: Log>(store: &Store<L>, len: usize) -> Vec<(ContentKey, Vec<u8>)> {
        let mut content = noise(11, 4_000);
        let mut prev = store.put(&content, None).unwrap();
        let mut versions = vec![(prev, content.clone())];
        for i in 1..len {
            content.extend_from_slice(format!("appended line {i}\n").as_bytes());
            prev = store.put(&content, Some(&prev)).unwrap();
            versions.push((prev, content.clone()));
        }
        versions
    }

    #[test]
    fn scenario_delta_then_depth_bound() {
        let (a, b) = scenario_pair();
        let store = memory_store(StoreConfig::default());

        let ra = store.put_with_report(&a, None).unwrap();
        assert_eq!(
            ra.plan,
            WritePlan::Snapshot {
                reason: SnapshotReason::NoHint
            }
        );
        assert_eq!(store.chain_depth(&ra.key).unwrap(), 0);

        let rb = store.put_with_report(&b, Some(&ra.key)).unwrap();
        assert_eq!(rb.plan, WritePlan::Delta { base: ra.key, depth: 1 });
        assert_eq!(store.chain_depth(&rb.key).unwrap(), 1);
        let link = &store.delta_chain(&rb.key).unwrap()[0];
        assert!(link.payload_size < 1_000, "delta payload {} bytes", link.payload_size);
        assert_eq!(store.get(&rb.key).unwrap(), b);

        let bounded = memory_store(StoreConfig {
            max_chain_depth: 1,
            ..StoreConfig::default()
        });
        let ka = bounded.put(&a, None).unwrap();
        let kb = bounded.put(&b, Some(&ka)).unwrap();
        assert_eq!(bounded.chain_depth(&kb).unwrap(), 1);

        let mut c = b.clone();
        c[31_000..].fill(b'c');
        let rc = bounded.put_with_report(&c, Some(&kb)).unwrap();
        assert_eq!(
            rc.plan,
            WritePlan::Snapshot {
                reason: SnapshotReason::ChainTooDeep
            }
        );
        assert_eq!(bounded.chain_depth(&rc.key).unwrap(), 0);
        assert_eq!(bounded.get(&rc.key).unwrap(), c);
    }

    #[test]
    fn put_is_idempotent() {
        let store = memory_store(StoreConfig::default());
        let first = store.put_with_report(b"same bytes", None).unwrap();
        let second = store.put_with_report(b"same bytes", None).unwrap();
        assert_eq!(first.key, second.key);
        assert_eq!(second.plan, WritePlan::Existing);
        assert_eq!(second.stored_bytes, 0);
        assert_eq!(store.log().appended(), 1);
    }

    #[test]
    fn key_is_content_derived() {
        let store = memory_store(StoreConfig::default());
        let key = store.put(b"hello", None).unwrap();
        assert_eq!(key, ContentKey::of(b"hello"));
        assert!(store.contains(&key).unwrap());
        assert!(!store.contains(&ContentKey::of(b"other")).unwrap());
    }

    #[test]
    fn unwritten_key_is_not_found() {
        let store = memory_store(StoreConfig::default());
        store.put(b"something", None).unwrap();
        let err = store.get(&ContentKey::of(b"never written")).unwrap_err();
        assert!(matches!(err, StoreError::KeyNotFound(_)));
        assert!(matches!(
            store.chain_info(&ContentKey::of(b"never written")),
            Err(StoreError::KeyNotFound(_))
        ));
    }

    #[test]
    fn empty_content_roundtrips() {
        let store = memory_store(StoreConfig::default());
        let key = store.put(b"", None).unwrap();
        assert_eq!(store.get(&key).unwrap(), b"");
        let next = store.put(b"now with bytes", Some(&key)).unwrap();
        assert_eq!(store.get(&next).unwrap(), b"now with bytes");
    }

    #[test]
    fn unrelated_content_still_reconstructs() {
        let store = memory_store(StoreConfig::default());
        let a = noise(1, 8_000);
        let b = noise(2, 8_000);
        let ka = store.put(&a, None).unwrap();
        let kb = store.put(&b, Some(&ka)).unwrap();
        assert_eq!(store.get(&kb).unwrap(), b);
        assert_eq!(store.get(&ka).unwrap(), a);
    }

    #[test]
    fn long_chain_resolves_and_reports_metadata() {
        let store = memory_store(StoreConfig::default());
        let versions = build_chain(&store, 10);
        for (depth, (key, content)) in versions.iter().enumerate() {
            assert_eq!(&store.get(key).unwrap(), content);
            assert_eq!(store.chain_depth(key).unwrap(), depth as u32);
        }
        let (last, _) = versions.last().unwrap();
        let expected: u64 = versions.iter().map(|(_, c)| c.len() as u64).sum();
        assert_eq!(store.chain_cumulative_size(last).unwrap(), expected);
        assert_eq!(store.delta_chain(last).unwrap().len(), versions.len());
    }

    #[test]
    fn depth_never_exceeds_bound() {
        let store = memory_store(StoreConfig {
            max_chain_depth: 3,
            ..StoreConfig::default()
        });
        let versions = build_chain(&store, 12);
        for (key, content) in &versions {
            assert!(store.chain_depth(key).unwrap() <= 3);
            assert_eq!(&store.get(key).unwrap(), content);
        }
    }

    #[test]
    fn get_many_matches_get() {
        let store = memory_store(StoreConfig::default());
        let versions = build_chain(&store, 6);
        let keys: Vec<ContentKey> = versions.iter().map(|(k, _)| *k).rev().collect();
        let contents = store.get_many(&keys).unwrap();
        for (key, content) in keys.iter().zip(&contents) {
            assert_eq!(&store.get(key).unwrap(), content);
        }
    }

    #[test]
    fn cache_is_filled_on_put_and_get() {
        let store = memory_store(StoreConfig {
            cache_capacity: 8,
            ..StoreConfig::default()
        });
        let versions = build_chain(&store, 3);
        let cache = store.cache().unwrap();
        assert_eq!(cache.len(), 3);
        cache.clear();
        assert_eq!(store.get(&versions[2].0).unwrap(), versions[2].1);
        assert_eq!(cache.len(), 1);
        assert!(memory_store(StoreConfig::default()).cache().is_none());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = Store::open(
            StoreConfig {
                max_chain_depth: 0,
                ..StoreConfig::default()
            },
            MemoryLog::new(),
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    // ---- Corruption ----

    #[test]
    fn tampered_delta_is_reported() {
        let store = memory_store(StoreConfig::default());
        let versions = build_chain(&store, 2);
        let key = versions[1].0;
        let mut entry = Entry::decode(&store.log().lookup(&key).unwrap().unwrap()).unwrap();
        let mid = entry.payload.len() / 2;
        entry.payload[mid] ^= 0x5A;
        store.log().append(&key, &entry.encode()).unwrap();

        assert!(matches!(store.get(&key), Err(StoreError::CorruptDelta { .. })));
        // The base is untouched.
        assert_eq!(store.get(&versions[0].0).unwrap(), versions[0].1);
    }

    #[test]
    fn cyclic_chain_is_reported() {
        let store = memory_store(StoreConfig::default());
        let (a, b) = (ContentKey::of(b"a"), ContentKey::of(b"b"));
        store.log().append(&a, &Entry::delta(b, 2, vec![0]).encode()).unwrap();
        store.log().append(&b, &Entry::delta(a, 1, vec![0]).encode()).unwrap();
        assert!(matches!(store.get(&a), Err(StoreError::CorruptChain { .. })));
        assert!(matches!(store.chain_depth(&a), Err(StoreError::CorruptChain { .. })));
    }

    /// A log whose writes (and optionally reads) fail.
    struct FailingLog {
        fail_reads: bool,
    }

    impl Log for FailingLog {
        fn append(&self, _key: &ContentKey, _value: &[u8]) -> LogResult<()> {
            Err(LogError::Io(io::Error::other("disk full")))
        }

        fn lookup(&self, _key: &ContentKey) -> LogResult<Option<Vec<u8>>> {
            if self.fail_reads {
                Err(LogError::Io(io::Error::other("read error")))
            } else {
                Ok(None)
            }
        }
    }

    #[test]
    fn write_failure_propagates() {
        let store = Store::open(StoreConfig::default(), FailingLog { fail_reads: false }).unwrap();
        let err = store.put(b"content", None).unwrap_err();
        assert!(matches!(
            err,
            StoreError::StorageWriteFailed { key, .. } if key == ContentKey::of(b"content")
        ));
    }

    #[test]
    fn read_failure_propagates() {
        let store = Store::open(StoreConfig::default(), FailingLog { fail_reads: true }).unwrap();
        let key = ContentKey::of(b"content");
        assert!(matches!(
            store.contains(&key),
            Err(StoreError::StorageReadFailed { .. })
        ));
        assert!(matches!(store.get(&key), Err(StoreError::StorageReadFailed { .. })));
        assert!(matches!(
            store.put(b"content", None),
            Err(StoreError::StorageReadFailed { .. })
        ));
    }

    // ---- Rebase ----

    #[test]
    fn rebase_to_snapshot() {
        let store = memory_store(StoreConfig::default());
        let versions = build_chain(&store, 4);
        let (top, content) = &versions[3];

        let outcome = store.rebase(top, None).unwrap();
        assert_eq!(
            outcome,
            RebaseOutcome::Rebased {
                from_depth: 3,
                to_depth: 0,
                base: None
            }
        );
        assert_eq!(store.chain_depth(top).unwrap(), 0);
        assert_eq!(&store.get(top).unwrap(), content);
        assert_eq!(store.log().superseded(), 1);
    }

    #[test]
    fn rebase_keeps_dependents_resolvable() {
        let store = memory_store(StoreConfig::default());
        let versions = build_chain(&store, 4);
        store.rebase(&versions[1].0, None).unwrap();

        for (key, content) in &versions {
            assert_eq!(&store.get(key).unwrap(), content);
        }
        // Recorded depth is an upper bound; the walk is now shorter.
        assert_eq!(store.chain_depth(&versions[3].0).unwrap(), 3);
        assert_eq!(store.delta_chain(&versions[3].0).unwrap().len(), 3);
    }

    #[test]
    fn rebase_onto_shallower_base() {
        let store = memory_store(StoreConfig::default());
        let versions = build_chain(&store, 4);
        let (root, _) = versions[0];
        let (top, content) = &versions[3];

        let outcome = store.rebase(top, Some(&root)).unwrap();
        assert_eq!(
            outcome,
            RebaseOutcome::Rebased {
                from_depth: 3,
                to_depth: 1,
                base: Some(root)
            }
        );
        assert_eq!(&store.get(top).unwrap(), content);
    }

    #[test]
    fn rebase_onto_deeper_base_writes_snapshot() {
        let store = memory_store(StoreConfig::default());
        let versions = build_chain(&store, 4);
        let outcome = store.rebase(&versions[1].0, Some(&versions[3].0)).unwrap();
        assert_eq!(
            outcome,
            RebaseOutcome::Rebased {
                from_depth: 1,
                to_depth: 0,
                base: None
            }
        );
        for (key, content) in &versions {
            assert_eq!(&store.get(key).unwrap(), content);
        }
    }

    #[test]
    fn rebase_rejects_bad_requests() {
        let store = memory_store(StoreConfig::default());
        let versions = build_chain(&store, 2);
        let (top, _) = versions[1];

        assert_eq!(
            store.rebase(&versions[0].0, None).unwrap(),
            RebaseOutcome::Unchanged { depth: 0 }
        );
        assert!(matches!(
            store.rebase(&ContentKey::of(b"missing"), None),
            Err(StoreError::KeyNotFound(_))
        ));
        assert!(matches!(
            store.rebase(&top, Some(&top)),
            Err(StoreError::InvalidRebase { .. })
        ));
        assert!(matches!(
            store.rebase(&top, Some(&ContentKey::of(b"missing"))),
            Err(StoreError::InvalidRebase { .. })
        ));
    }

    #[test]
    fn rebase_if_needed_after_tightening_bounds() {
        let log = Arc::new(MemoryLog::new());
        let loose = Store::open(
            StoreConfig {
                max_chain_depth: 6,
                ..StoreConfig::default()
            },
            Arc::clone(&log),
        )
        .unwrap();
        let versions = build_chain(&loose, 6);

        let tight = Store::open(
            StoreConfig {
                max_chain_depth: 2,
                ..StoreConfig::default()
            },
            Arc::clone(&log),
        )
        .unwrap();
        // Old data remains readable under the tighter bound.
        assert_eq!(tight.get(&versions[5].0).unwrap(), versions[5].1);

        assert_eq!(
            tight.rebase_if_needed(&versions[1].0).unwrap(),
            RebaseOutcome::Unchanged { depth: 1 }
        );
        assert!(matches!(
            tight.rebase_if_needed(&versions[5].0).unwrap(),
            RebaseOutcome::Rebased { to_depth: 0, .. }
        ));
        assert_eq!(tight.chain_depth(&versions[5].0).unwrap(), 0);
        assert_eq!(tight.get(&versions[5].0).unwrap(), versions[5].1);
    }

    #[test]
    fn rebase_if_needed_after_tightening_byte_bound() {
        let log = Arc::new(MemoryLog::new());
        let loose = Store::open(StoreConfig::default(), Arc::clone(&log)).unwrap();
        let versions = build_chain(&loose, 4);
        let limit = loose.chain_cumulative_size(&versions[1].0).unwrap();

        let tight = Store::open(
            StoreConfig {
                max_chain_bytes: limit,
                ..StoreConfig::default()
            },
            Arc::clone(&log),
        )
        .unwrap();

        assert_eq!(
            tight.rebase_if_needed(&versions[1].0).unwrap(),
            RebaseOutcome::Unchanged { depth: 1 }
        );
        assert!(matches!(
            tight.rebase_if_needed(&versions[3].0).unwrap(),
            RebaseOutcome::Rebased {
                from_depth: 3,
                to_depth: 0,
                ..
            }
        ));
        assert!(tight.chain_cumulative_size(&versions[3].0).unwrap() <= limit);
        assert_eq!(tight.get(&versions[3].0).unwrap(), versions[3].1);
    }

    const PAD: [u8; 4096] = [0xFF; 4096];

    /// Wraps every delta in padding so no delta beats a snapshot.
    struct PaddedDiffCodec(ZstdDeltaCodec);

    impl DeltaCodec for PaddedDiffCodec {
        fn diff(&self, base: &[u8], target: &[u8]) -> CodecResult<Vec<u8>> {
            let mut delta = PAD.to_vec();
            delta.extend(self.0.diff(base, target)?);
            Ok(delta)
        }

        fn apply(&self, base: &[u8], delta: &[u8]) -> CodecResult<Vec<u8>> {
            self.0.apply(base, delta.strip_prefix(&PAD[..]).unwrap_or(delta))
        }

        fn compress(&self, content: &[u8]) -> CodecResult<Vec<u8>> {
            self.0.compress(content)
        }

        fn decompress(&self, payload: &[u8]) -> CodecResult<Vec<u8>> {
            self.0.decompress(payload)
        }

        fn content_size(&self, payload: &[u8]) -> CodecResult<u64> {
            self.0.content_size(payload)
        }
    }

    #[test]
    fn rebase_falls_back_to_snapshot_when_delta_is_larger() {
        let log = Arc::new(MemoryLog::new());
        let versions = build_chain(
            &Store::open(StoreConfig::default(), Arc::clone(&log)).unwrap(),
            4,
        );
        let (root, _) = versions[0];
        let (top, content) = &versions[3];

        let padded = Store::with_codec(
            StoreConfig::default(),
            Arc::clone(&log),
            PaddedDiffCodec(ZstdDeltaCodec::default()),
        )
        .unwrap();
        assert_eq!(
            padded.rebase(top, Some(&root)).unwrap(),
            RebaseOutcome::Rebased {
                from_depth: 3,
                to_depth: 0,
                base: None
            }
        );
        assert_eq!(padded.chain_depth(top).unwrap(), 0);
        assert_eq!(&padded.get(top).unwrap(), content);
    }

    // ---- Persistence ----

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.log");

        let versions = {
            let store =
                Store::open_file(&path, StoreConfig::default(), FileLogConfig::default()).unwrap();
            let versions = build_chain(&store, 5);
            store.rebase(&versions[4].0, None).unwrap();
            store.flush().unwrap();
            versions
        };

        let store =
            Store::open_file(&path, StoreConfig::default(), FileLogConfig::default()).unwrap();
        for (key, content) in &versions {
            assert_eq!(&store.get(key).unwrap(), content);
        }
        assert_eq!(store.chain_depth(&versions[4].0).unwrap(), 0);
        assert_eq!(store.chain_depth(&versions[3].0).unwrap(), 3);
    }

    // ---- Concurrency ----

    #[test]
    fn concurrent_writers_and_readers() {
        let store = Arc::new(memory_store(StoreConfig::default()));
        let shared = noise(99, 2_000);

        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let store = Arc::clone(&store);
                let shared = shared.clone();
                thread::spawn(move || {
                    assert_eq!(store.put(&shared, None).unwrap(), ContentKey::of(&shared));
                    let mut content = noise(t + 100, 3_000);
                    let mut prev = store.put(&content, None).unwrap();
                    let mut mine = vec![(prev, content.clone())];
                    for i in 0..10 {
                        content.extend_from_slice(format!("thread {t} line {i}\n").as_bytes());
                        prev = store.put(&content, Some(&prev)).unwrap();
                        mine.push((prev, content.clone()));
                    }
                    for (key, expected) in &mine {
                        assert_eq!(&store.get(key).unwrap(), expected);
                    }
                    mine
                })
            })
            .collect();

        for handle in handles {
            for (key, content) in handle.join().unwrap() {
                assert_eq!(store.get(&key).unwrap(), content);
            }
        }
        assert_eq!(store.get(&ContentKey::of(&shared)).unwrap(), shared);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn chain_bound_and_reconstruction_hold(
            max_depth in 1u32..5,
            ops in prop::collection::vec((any::<usize>(), any::<usize>(), any::<u8>()), 1..16),
        ) {
            let store = memory_store(StoreConfig {
                max_chain_depth: max_depth,
                ..StoreConfig::default()
            });
            let root = noise(5, 1_500);
            let mut versions = vec![(store.put(&root, None).unwrap(), root)];

            for (pick, pos, byte) in ops {
                let (hint, base) = versions[pick % versions.len()].clone();
                let mut content = base;
                let at = pos % content.len();
                content[at] = byte;
                content.push(byte);
                let key = store.put(&content, Some(&hint)).unwrap();
                versions.push((key, content));
            }

            for (key, content) in &versions {
                prop_assert!(store.chain_depth(key).unwrap() <= max_depth);
                prop_assert_eq!(&store.get(key).unwrap(), content);
            }
        }
    }
}
