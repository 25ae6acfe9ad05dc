//! Append-only, key-addressed log substrate for zstore.
//!
//! The store above this crate never updates a record in place. It appends
//! a value under a key and later asks for the most recent value appended
//! under that key. Superseded records stay where they are until an external
//! sweep reclaims them.
//!
//! # Backends
//!
//! All backends implement the [`Log`] trait:
//!
//! - [`MemoryLog`] -- `HashMap`-based log for tests and embedding
//! - [`FileLog`] -- single append-only file with CRC-framed records and an
//!   in-memory index rebuilt on open
//!
//! # Design Rules
//!
//! 1. Appends never modify earlier records.
//! 2. A lookup returns the latest value appended for the key.
//! 3. Concurrent lookups are always safe.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use error::{LogError, LogResult};
pub use file::{FileLog, FileLogConfig, SyncMode};
pub use memory::MemoryLog;
pub use traits::Log;
