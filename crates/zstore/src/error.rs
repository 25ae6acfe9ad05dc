use zstore_delta::CodecError;
use zstore_log::LogError;
use zstore_types::ContentKey;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested key was never written.
    #[error("key not found: {0}")]
    KeyNotFound(ContentKey),

    /// A delta payload does not apply cleanly to its stated base.
    #[error("corrupt delta for {key}: {reason}")]
    CorruptDelta { key: ContentKey, reason: String },

    /// Structural violation in a chain: missing base, non-decreasing
    /// depth, or a walk past the resolve ceiling.
    #[error("corrupt chain at {key}: {reason}")]
    CorruptChain { key: ContentKey, reason: String },

    /// Entry bytes fail to decode, or a snapshot fails to decompress.
    #[error("corrupt entry {key}: {reason}")]
    CorruptEntry { key: ContentKey, reason: String },

    /// The log substrate failed on read.
    #[error("storage read failed for {key}: {source}")]
    StorageReadFailed { key: ContentKey, source: LogError },

    /// The log substrate failed on write.
    #[error("storage write failed for {key}: {source}")]
    StorageWriteFailed { key: ContentKey, source: LogError },

    /// The log failed outside any single key: open or flush.
    #[error("log error: {0}")]
    Log(#[source] LogError),

    /// The codec failed to compress content being written.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A rebase request cannot be honoured as asked.
    #[error("invalid rebase of {key}: {reason}")]
    InvalidRebase { key: ContentKey, reason: String },

    /// Configuration is malformed or out of range.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
