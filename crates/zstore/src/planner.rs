//! Write planning: decide how a new content is stored.
//!
//! A write becomes a delta only when the caller offers a base hint whose
//! chain still has room under both configured bounds, and only when the
//! delta actually beats an independent snapshot. Every other path lands on
//! a snapshot, tagged with the reason.

use std::fmt;

use tracing::{debug, warn};
use zstore_delta::DeltaCodec;
use zstore_log::Log;
use zstore_types::ContentKey;

use crate::config::StoreConfig;
use crate::entry::Entry;
use crate::error::StoreResult;
use crate::resolver::ChainResolver;

/// Why a write was stored as a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SnapshotReason {
    /// No base hint was supplied.
    NoHint,
    /// The hinted key is not stored.
    HintMissing,
    /// The hint's chain is already at `max_chain_depth`.
    ChainTooDeep,
    /// Extending the hint's chain would exceed `max_chain_bytes`.
    ChainTooLarge,
    /// The codec could not diff against the hinted base.
    DiffFailed,
    /// The delta was not smaller than a snapshot of the same content.
    DeltaNotSmaller,
}

impl fmt::Display for SnapshotReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoHint => "no_hint",
            Self::HintMissing => "hint_missing",
            Self::ChainTooDeep => "chain_too_deep",
            Self::ChainTooLarge => "chain_too_large",
            Self::DiffFailed => "diff_failed",
            Self::DeltaNotSmaller => "delta_not_smaller",
        };
        f.write_str(s)
    }
}

/// Outcome of planning a single write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WritePlan {
    /// The key is already stored; nothing is appended.
    Existing,
    Snapshot { reason: SnapshotReason },
    Delta { base: ContentKey, depth: u32 },
}

impl WritePlan {
    pub fn is_delta(&self) -> bool {
        matches!(self, Self::Delta { .. })
    }
}

/// A planned write: the key, the decision, and the entry to append (if any).
#[derive(Clone, Debug)]
pub struct PlannedWrite {
    pub key: ContentKey,
    pub plan: WritePlan,
    pub entry: Option<Entry>,
}

pub struct WritePlanner<'a, L: ?Sized, C: ?Sized> {
    resolver: ChainResolver<'a, L, C>,
    codec: &'a C,
    config: &'a StoreConfig,
}

impl<'a, L: Log + ?Sized, C: DeltaCodec + ?Sized> WritePlanner<'a, L, C> {
    pub fn new(resolver: ChainResolver<'a, L, C>, codec: &'a C, config: &'a StoreConfig) -> Self {
        Self {
            resolver,
            codec,
            config,
        }
    }

    /// Plan the write of `content`, optionally diffing against `hint`.
    ///
    /// Does not append anything. Errors reading the hint's chain propagate.
    pub fn plan(&self, content: &[u8], hint: Option<&ContentKey>) -> StoreResult<PlannedWrite> {
        let key = ContentKey::of(content);
        if self.resolver.contains(&key)? {
            return Ok(PlannedWrite {
                key,
                plan: WritePlan::Existing,
                entry: None,
            });
        }

        let (plan, entry) = match self.usable_base(content, hint)? {
            Ok((base, depth)) => self.plan_delta(&key, content, base, depth)?,
            Err(reason) => (WritePlan::Snapshot { reason }, self.snapshot(content)?),
        };
        debug!(key = %key.short_hex(), ?plan, "planned write");
        Ok(PlannedWrite {
            key,
            plan,
            entry: Some(entry),
        })
    }

    /// Check the hint against both chain bounds, yielding the base and the
    /// depth the new delta would have.
    fn usable_base(
        &self,
        content: &[u8],
        hint: Option<&ContentKey>,
    ) -> StoreResult<Result<(ContentKey, u32), SnapshotReason>> {
        let Some(hint) = hint else {
            return Ok(Err(SnapshotReason::NoHint));
        };
        if !self.resolver.contains(hint)? {
            return Ok(Err(SnapshotReason::HintMissing));
        }

        let info = self.resolver.chain_info(hint)?;
        if info.depth >= self.config.max_chain_depth {
            return Ok(Err(SnapshotReason::ChainTooDeep));
        }
        let cumulative = info.cumulative_size.saturating_add(content.len() as u64);
        if cumulative > self.config.max_chain_bytes {
            return Ok(Err(SnapshotReason::ChainTooLarge));
        }
        Ok(Ok((*hint, info.depth + 1)))
    }

    fn plan_delta(
        &self,
        key: &ContentKey,
        content: &[u8],
        base: ContentKey,
        depth: u32,
    ) -> StoreResult<(WritePlan, Entry)> {
        let base_content = self.resolver.resolve(&base)?;
        let snapshot = self.codec.compress(content)?;

        let delta = match self.codec.diff(&base_content, content) {
            Ok(delta) => delta,
            Err(e) => {
                warn!(
                    key = %key.short_hex(),
                    base = %base.short_hex(),
                    error = %e,
                    "diff failed, storing snapshot"
                );
                let reason = SnapshotReason::DiffFailed;
                return Ok((WritePlan::Snapshot { reason }, Entry::snapshot(snapshot)));
            }
        };

        if delta.len() >= snapshot.len() {
            let reason = SnapshotReason::DeltaNotSmaller;
            return Ok((WritePlan::Snapshot { reason }, Entry::snapshot(snapshot)));
        }
        Ok((WritePlan::Delta { base, depth }, Entry::delta(base, depth, delta)))
    }

    fn snapshot(&self, content: &[u8]) -> StoreResult<Entry> {
        Ok(Entry::snapshot(self.codec.compress(content)?))
    }
}
