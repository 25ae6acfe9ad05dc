//! Chain resolution: header walks and full reconstruction.
//!
//! A walk follows `Delta -> base` links from a key until it reaches a
//! snapshot or a base whose content is already known. Each hop is pushed
//! onto a resolve stack; reconstruction then pops the stack, applying one
//! delta per frame. Nothing recurses, and every walk is bounded because
//! recorded depths must strictly decrease towards the snapshot.

use std::collections::HashMap;

use zstore_delta::DeltaCodec;
use zstore_log::Log;
use zstore_types::ContentKey;

use crate::cache::ContentCache;
use crate::entry::{Entry, EntryKind};
use crate::error::{StoreError, StoreResult};

/// Hard ceiling on the recorded depth of any entry the resolver will walk.
///
/// Independent of the configured write-time bound, so lowering
/// `max_chain_depth` never makes existing data unreadable.
pub const MAX_RESOLVE_DEPTH: u32 = 1024;

/// Metadata of a key's chain, derived without decompressing payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainInfo {
    /// Recorded depth of the key's entry. An upper bound on the hops to the
    /// snapshot: rebasing an ancestor can shorten the walk without touching
    /// the descendants' headers.
    pub depth: u32,
    /// Sum of the full content sizes materialised along the chain, the
    /// snapshot included.
    pub cumulative_size: u64,
}

/// One hop of a chain, as reported by [`ChainResolver::delta_chain`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainLink {
    pub key: ContentKey,
    pub kind: EntryKind,
    /// Full content length recorded in the payload.
    pub content_size: u64,
    /// Stored payload length.
    pub payload_size: usize,
}

/// A resolve-stack frame.
struct Frame {
    key: ContentKey,
    entry: Entry,
}

/// Result of walking a chain: frames from the requested key downwards, plus
/// the content of the last frame's base when the walk stopped early on a
/// known content.
struct Walk {
    frames: Vec<Frame>,
    base_content: Option<Vec<u8>>,
}

/// Reads and reconstructs entries through a log and codec.
pub struct ChainResolver<'a, L: ?Sized, C: ?Sized> {
    log: &'a L,
    codec: &'a C,
    cache: Option<&'a ContentCache>,
}

impl<'a, L: Log + ?Sized, C: DeltaCodec + ?Sized> ChainResolver<'a, L, C> {
    pub fn new(log: &'a L, codec: &'a C) -> Self {
        Self {
            log,
            codec,
            cache: None,
        }
    }

    /// Consult (but never fill) a cross-call cache during walks.
    pub fn with_cache(mut self, cache: Option<&'a ContentCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Check whether any entry is stored under `key`.
    pub fn contains(&self, key: &ContentKey) -> StoreResult<bool> {
        self.log
            .contains(key)
            .map_err(|source| StoreError::StorageReadFailed { key: *key, source })
    }

    /// Read and decode the entry stored under `key`.
    pub fn load(&self, key: &ContentKey) -> StoreResult<Option<Entry>> {
        let bytes = self
            .log
            .lookup(key)
            .map_err(|source| StoreError::StorageReadFailed { key: *key, source })?;
        bytes
            .map(|b| {
                Entry::decode(&b).map_err(|e| StoreError::CorruptEntry {
                    key: *key,
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    fn load_existing(&self, key: &ContentKey) -> StoreResult<Entry> {
        self.load(key)?.ok_or(StoreError::KeyNotFound(*key))
    }

    fn known(
        &self,
        key: &ContentKey,
        memo: Option<&HashMap<ContentKey, Vec<u8>>>,
    ) -> Option<Vec<u8>> {
        memo.and_then(|m| m.get(key).cloned())
            .or_else(|| self.cache.and_then(|c| c.get(key)))
    }

    /// Walk from `key` towards its snapshot, stopping early at the first
    /// base for which `known` returns content.
    fn walk<F>(&self, key: &ContentKey, mut known: F) -> StoreResult<Walk>
    where
        F: FnMut(&ContentKey) -> Option<Vec<u8>>,
    {
        let top = self.load_existing(key)?;
        if top.depth() > MAX_RESOLVE_DEPTH {
            return Err(StoreError::CorruptChain {
                key: *key,
                reason: format!(
                    "depth {} exceeds resolve ceiling {MAX_RESOLVE_DEPTH}",
                    top.depth()
                ),
            });
        }

        let mut frames = Vec::with_capacity(top.depth() as usize + 1);
        let mut current = *key;
        let mut entry = top;
        loop {
            let EntryKind::Delta { base, depth } = entry.kind else {
                frames.push(Frame { key: current, entry });
                return Ok(Walk {
                    frames,
                    base_content: None,
                });
            };
            frames.push(Frame { key: current, entry });

            if let Some(content) = known(&base) {
                return Ok(Walk {
                    frames,
                    base_content: Some(content),
                });
            }

            let next = self.load(&base)?.ok_or_else(|| StoreError::CorruptChain {
                key: current,
                reason: format!("base {} is missing", base.short_hex()),
            })?;
            if next.depth() >= depth {
                return Err(StoreError::CorruptChain {
                    key: current,
                    reason: format!(
                        "base {} has depth {}, expected less than {depth}",
                        base.short_hex(),
                        next.depth()
                    ),
                });
            }
            current = base;
            entry = next;
        }
    }

    /// Reconstruct the full content stored under `key`.
    pub fn resolve(&self, key: &ContentKey) -> StoreResult<Vec<u8>> {
        self.resolve_inner(key, None)
    }

    /// Reconstruct several keys, decoding each shared chain member once.
    pub fn resolve_many(&self, keys: &[ContentKey]) -> StoreResult<Vec<Vec<u8>>> {
        let mut memo = HashMap::new();
        keys.iter()
            .map(|key| self.resolve_inner(key, Some(&mut memo)))
            .collect()
    }

    fn resolve_inner(
        &self,
        key: &ContentKey,
        mut memo: Option<&mut HashMap<ContentKey, Vec<u8>>>,
    ) -> StoreResult<Vec<u8>> {
        if let Some(content) = self.known(key, memo.as_deref()) {
            return Ok(content);
        }

        let Walk {
            mut frames,
            base_content,
        } = {
            let seen = memo.as_deref();
            self.walk(key, |k| self.known(k, seen))?
        };

        let mut content = base_content;
        while let Some(Frame { key: hop, entry }) = frames.pop() {
            let rebuilt = match (entry.kind, content.take()) {
                (EntryKind::Snapshot, _) => {
                    let rebuilt = self.codec.decompress(&entry.payload).map_err(|e| {
                        StoreError::CorruptEntry {
                            key: hop,
                            reason: e.to_string(),
                        }
                    })?;
                    if !hop.matches(&rebuilt) {
                        return Err(StoreError::CorruptEntry {
                            key: hop,
                            reason: "snapshot content does not hash to its key".into(),
                        });
                    }
                    rebuilt
                }
                (EntryKind::Delta { .. }, Some(base)) => {
                    let rebuilt = self.codec.apply(&base, &entry.payload).map_err(|e| {
                        StoreError::CorruptDelta {
                            key: hop,
                            reason: e.to_string(),
                        }
                    })?;
                    if !hop.matches(&rebuilt) {
                        return Err(StoreError::CorruptDelta {
                            key: hop,
                            reason: "reconstructed content does not hash to its key".into(),
                        });
                    }
                    rebuilt
                }
                (EntryKind::Delta { base, .. }, None) => {
                    return Err(StoreError::CorruptChain {
                        key: hop,
                        reason: format!("base {} was not reconstructed", base.short_hex()),
                    });
                }
            };
            if let Some(memo) = memo.as_deref_mut() {
                memo.insert(hop, rebuilt.clone());
            }
            content = Some(rebuilt);
        }

        content.ok_or_else(|| StoreError::CorruptChain {
            key: *key,
            reason: "empty chain".into(),
        })
    }

    /// Every hop from `key` down to its snapshot. Payloads are not decompressed.
    pub fn delta_chain(&self, key: &ContentKey) -> StoreResult<Vec<ChainLink>> {
        let walk = self.walk(key, |_| None)?;
        walk.frames
            .into_iter()
            .map(|Frame { key, entry }| {
                let content_size = self.codec.content_size(&entry.payload).map_err(|e| {
                    StoreError::CorruptEntry {
                        key,
                        reason: e.to_string(),
                    }
                })?;
                Ok(ChainLink {
                    key,
                    kind: entry.kind,
                    content_size,
                    payload_size: entry.payload.len(),
                })
            })
            .collect()
    }

    /// Depth and cumulative size of `key`'s chain.
    pub fn chain_info(&self, key: &ContentKey) -> StoreResult<ChainInfo> {
        let links = self.delta_chain(key)?;
        let depth = links.first().map(|l| l.kind.depth()).unwrap_or(0);
        let cumulative_size = links.iter().map(|l| l.content_size).sum();
        Ok(ChainInfo {
            depth,
            cumulative_size,
        })
    }

    pub fn chain_depth(&self, key: &ContentKey) -> StoreResult<u32> {
        self.chain_info(key).map(|info| info.depth)
    }

    pub fn chain_cumulative_size(&self, key: &ContentKey) -> StoreResult<u64> {
        self.chain_info(key).map(|info| info.cumulative_size)
    }
}
