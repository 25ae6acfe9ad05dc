//! Delta codec for zstore.
//!
//! Produces and consumes compact representations of the difference between
//! two byte sequences. A delta is a zstd frame compressed with the base
//! sequence loaded as a raw-content dictionary, so any run of bytes shared
//! with the base costs a back-reference instead of literal bytes.
//!
//! # Key Types
//!
//! - [`DeltaCodec`] -- the `diff`/`apply` contract the store depends on
//! - [`ZstdDeltaCodec`] -- the zstd-backed implementation
//! - [`encode_varint`] / [`decode_varint`] -- LEB128 integers shared with the entry format
//!
//! Every payload produced here, delta or snapshot, begins with a varint
//! holding the full content length. Readers can size a chain without
//! decompressing anything.

pub mod codec;
pub mod error;
pub mod varint;

pub use codec::{DeltaCodec, ZstdDeltaCodec, DEFAULT_COMPRESSION_LEVEL, MAX_CONTENT_SIZE};
pub use error::{CodecError, CodecResult};
pub use varint::{decode_varint, encode_varint, MAX_VARINT_LEN};
