//! Delta-chained content-addressed store.
//!
//! Content is stored under the BLAKE3 key of its bytes. A new content may
//! be stored as a delta against a caller-supplied base hint, forming a
//! chain that ends in an independently compressed snapshot. Chains are
//! bounded by depth and by the bytes a reader must materialise, so reads
//! stay cheap no matter how many revisions are written.
//!
//! # Architecture
//!
//! - **Entry**: the on-disk record, a snapshot or a delta naming its base and depth
//! - **ChainResolver**: header-only chain walks and stack-based reconstruction
//! - **WritePlanner**: chooses snapshot or delta for each write
//! - **Store**: the entry point tying a [`Log`](zstore_log::Log), a
//!   [`DeltaCodec`](zstore_delta::DeltaCodec), and a [`StoreConfig`] together
//!
//! # Invariants
//!
//! 1. `get(put(c, hint)) == c` for every content and hint.
//! 2. No write creates a chain deeper than `max_chain_depth`.
//! 3. Entries are never modified; a rebase appends a new representation.
//! 4. Recorded depths strictly decrease towards the snapshot, so every
//!    walk terminates.

pub mod cache;
pub mod config;
pub mod entry;
pub mod error;
pub mod planner;
pub mod resolver;
pub mod store;

pub use cache::ContentCache;
pub use config::StoreConfig;
pub use entry::{Entry, EntryError, EntryKind};
pub use error::{StoreError, StoreResult};
pub use planner::{PlannedWrite, SnapshotReason, WritePlan, WritePlanner};
pub use resolver::{ChainInfo, ChainLink, ChainResolver, MAX_RESOLVE_DEPTH};
pub use store::{PutReport, RebaseOutcome, Store};

pub use zstore_delta::{DeltaCodec, ZstdDeltaCodec};
pub use zstore_log::{FileLog, FileLogConfig, Log, MemoryLog, SyncMode};
pub use zstore_types::ContentKey;
