//! zstd dictionary deltas and independently compressed snapshots.
//!
//! Payload layout, shared by both kinds:
//!
//! ```text
//! [varint: full content length]
//! [zstd frame]
//! ```
//!
//! A delta frame is compressed with the base loaded as a raw-content
//! dictionary; a snapshot frame is plain zstd. An empty base carries no
//! dictionary on either side.

use zstd::bulk::{Compressor, Decompressor};

use crate::error::{CodecError, CodecResult};
use crate::varint::{decode_varint, encode_varint};

/// Default zstd compression level (1-22 scale).
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Largest content length a payload may declare.
///
/// Decompression preallocates the declared length, so a corrupt prefix must
/// not be able to request an arbitrary allocation.
pub const MAX_CONTENT_SIZE: u64 = 1 << 32;

/// Byte-level diff/patch primitive consumed by the store.
///
/// Implementations must guarantee `apply(base, diff(base, target)) == target`
/// for every pair of byte sequences. Payload bytes need not be stable across
/// implementations; only the round trip is part of the contract.
pub trait DeltaCodec: Send + Sync {
    /// Produce a payload that rebuilds `target` from `base`.
    fn diff(&self, base: &[u8], target: &[u8]) -> CodecResult<Vec<u8>>;

    /// Rebuild the target from `base` and a payload produced by [`diff`](Self::diff).
    ///
    /// Fails with [`CodecError::CorruptDelta`] when the payload was not
    /// produced against `base`.
    fn apply(&self, base: &[u8], delta: &[u8]) -> CodecResult<Vec<u8>>;

    /// Compress content on its own, for snapshot entries.
    fn compress(&self, content: &[u8]) -> CodecResult<Vec<u8>>;

    /// Inverse of [`compress`](Self::compress).
    fn decompress(&self, payload: &[u8]) -> CodecResult<Vec<u8>>;

    /// Full content length recorded in a payload, read without decompressing.
    fn content_size(&self, payload: &[u8]) -> CodecResult<u64>;
}

/// zstd-backed [`DeltaCodec`].
#[derive(Clone, Copy, Debug)]
pub struct ZstdDeltaCodec {
    level: i32,
}

impl ZstdDeltaCodec {
    /// Create a codec compressing at the given zstd level.
    pub fn new(level: i32) -> Self {
        Self { level }
    }

    /// The zstd compression level in use.
    pub fn level(&self) -> i32 {
        self.level
    }

    /// Refuse content whose length no payload may declare.
    fn check_len(content_len: usize) -> CodecResult<()> {
        if content_len as u64 > MAX_CONTENT_SIZE {
            return Err(CodecError::Compression(format!(
                "content of {content_len} bytes exceeds limit of {MAX_CONTENT_SIZE}"
            )));
        }
        Ok(())
    }

    fn frame(content_len: usize, frame: Vec<u8>) -> Vec<u8> {
        let mut payload = Vec::with_capacity(frame.len() + 5);
        encode_varint(&mut payload, content_len as u64);
        payload.extend_from_slice(&frame);
        payload
    }

    /// Split a payload into its declared content length and zstd frame.
    fn unframe(payload: &[u8]) -> CodecResult<(usize, &[u8])> {
        let (len, consumed) = decode_varint(payload)?;
        if len > MAX_CONTENT_SIZE {
            return Err(CodecError::Varint("content length exceeds limit"));
        }
        let len = usize::try_from(len)
            .map_err(|_| CodecError::Varint("content length exceeds address space"))?;
        Ok((len, &payload[consumed..]))
    }
}

impl Default for ZstdDeltaCodec {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_LEVEL)
    }
}

impl DeltaCodec for ZstdDeltaCodec {
    fn diff(&self, base: &[u8], target: &[u8]) -> CodecResult<Vec<u8>> {
        Self::check_len(target.len())?;
        let frame = if base.is_empty() {
            zstd::bulk::compress(target, self.level)
        } else {
            Compressor::with_dictionary(self.level, base).and_then(|mut c| c.compress(target))
        };
        let frame = frame.map_err(|e| CodecError::Compression(e.to_string()))?;
        Ok(Self::frame(target.len(), frame))
    }

    fn apply(&self, base: &[u8], delta: &[u8]) -> CodecResult<Vec<u8>> {
        let (len, frame) =
            Self::unframe(delta).map_err(|e| CodecError::CorruptDelta(e.to_string()))?;
        let target = if base.is_empty() {
            zstd::bulk::decompress(frame, len)
        } else {
            Decompressor::with_dictionary(base).and_then(|mut d| d.decompress(frame, len))
        };
        let target = target.map_err(|e| CodecError::CorruptDelta(e.to_string()))?;
        if target.len() != len {
            return Err(CodecError::CorruptDelta(format!(
                "size mismatch: expected {len}, got {}",
                target.len()
            )));
        }
        Ok(target)
    }

    fn compress(&self, content: &[u8]) -> CodecResult<Vec<u8>> {
        Self::check_len(content.len())?;
        let frame = zstd::bulk::compress(content, self.level)
            .map_err(|e| CodecError::Compression(e.to_string()))?;
        Ok(Self::frame(content.len(), frame))
    }

    fn decompress(&self, payload: &[u8]) -> CodecResult<Vec<u8>> {
        let (len, frame) = Self::unframe(payload)?;
        let content = zstd::bulk::decompress(frame, len)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        if content.len() != len {
            return Err(CodecError::Decompression(format!(
                "size mismatch: expected {len}, got {}",
                content.len()
            )));
        }
        Ok(content)
    }

    fn content_size(&self, payload: &[u8]) -> CodecResult<u64> {
        Self::unframe(payload).map(|(len, _)| len as u64)
    }
}
