//! Error types for the delta codec.

/// Errors that can occur while encoding or decoding payloads.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    /// The delta does not decode against the supplied base.
    #[error("corrupt delta: {0}")]
    CorruptDelta(String),

    /// zstd refused to compress the input.
    #[error("compression failed: {0}")]
    Compression(String),

    /// A snapshot payload could not be decompressed.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// A length prefix is truncated or overflows.
    #[error("invalid varint: {0}")]
    Varint(&'static str),
}

/// Convenience alias for codec results.
pub type CodecResult<T> = Result<T, CodecError>;
