/// Errors from log substrate operations.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// I/O error from the underlying file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record read back from disk does not match its framing.
    #[error("corrupt record at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    /// An earlier append failed and its partial record could not be removed.
    #[error("log writer unusable after a failed append at offset {offset}")]
    WriterPoisoned { offset: u64 },

    /// The value does not fit in a single framed record.
    #[error("record too large: {len} bytes")]
    RecordTooLarge { len: usize },
}

/// Result alias for log operations.
pub type LogResult<T> = Result<T, LogError>;
