//! On-disk entry encoding.
//!
//! ```text
//! [1 byte: variant tag]            0 = Snapshot, 1 = Delta
//! [32 bytes: base key]             Delta only
//! [varint: chain depth]            Delta only, >= 1
//! [varint: payload length]
//! [payload]                        compressed content or delta
//! ```

use zstore_delta::{decode_varint, encode_varint, CodecError};
use zstore_types::{ContentKey, KEY_LEN};

const TAG_SNAPSHOT: u8 = 0;
const TAG_DELTA: u8 = 1;

/// Failure to decode entry bytes.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EntryError {
    #[error("empty entry")]
    Empty,

    #[error("unknown variant tag: {0}")]
    UnknownTag(u8),

    #[error("truncated {0}")]
    Truncated(&'static str),

    #[error("delta entry with chain depth 0")]
    ZeroDepth,

    #[error("chain depth {0} out of range")]
    DepthOverflow(u64),

    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),

    #[error("{0}")]
    Varint(#[from] CodecError),
}

/// How an entry is stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    /// Full content, compressed on its own.
    Snapshot,
    /// Delta against `base`, `depth` hops from the nearest snapshot.
    Delta { base: ContentKey, depth: u32 },
}

impl EntryKind {
    /// Variant tag written as the first byte of the entry.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Snapshot => TAG_SNAPSHOT,
            Self::Delta { .. } => TAG_DELTA,
        }
    }

    /// Recorded chain depth; `0` for snapshots.
    pub fn depth(&self) -> u32 {
        match self {
            Self::Snapshot => 0,
            Self::Delta { depth, .. } => *depth,
        }
    }

    /// Base key, if this is a delta.
    pub fn base(&self) -> Option<ContentKey> {
        match self {
            Self::Snapshot => None,
            Self::Delta { base, .. } => Some(*base),
        }
    }
}

/// A decoded entry: its kind plus the opaque payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub kind: EntryKind,
    pub payload: Vec<u8>,
}

impl Entry {
    /// A snapshot entry holding an independently compressed payload.
    pub fn snapshot(payload: Vec<u8>) -> Self {
        Self {
            kind: EntryKind::Snapshot,
            payload,
        }
    }

    /// A delta entry against `base` at the given chain depth.
    pub fn delta(base: ContentKey, depth: u32, payload: Vec<u8>) -> Self {
        Self {
            kind: EntryKind::Delta { base, depth },
            payload,
        }
    }

    pub fn depth(&self) -> u32 {
        self.kind.depth()
    }

    pub fn is_snapshot(&self) -> bool {
        matches!(self.kind, EntryKind::Snapshot)
    }

    /// Serialize to the on-disk form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + KEY_LEN + 20 + self.payload.len());
        buf.push(self.kind.tag());
        if let EntryKind::Delta { base, depth } = &self.kind {
            buf.extend_from_slice(base.as_bytes());
            encode_varint(&mut buf, u64::from(*depth));
        }
        encode_varint(&mut buf, self.payload.len() as u64);
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parse the on-disk form. The whole slice must be consumed.
    pub fn decode(data: &[u8]) -> Result<Self, EntryError> {
        let (&tag, mut rest) = data.split_first().ok_or(EntryError::Empty)?;

        let kind = match tag {
            TAG_SNAPSHOT => EntryKind::Snapshot,
            TAG_DELTA => {
                if rest.len() < KEY_LEN {
                    return Err(EntryError::Truncated("base key"));
                }
                let (key_bytes, after_key) = rest.split_at(KEY_LEN);
                let base = ContentKey::from_slice(key_bytes)
                    .map_err(|_| EntryError::Truncated("base key"))?;
                let (depth, consumed) = decode_varint(after_key)?;
                if depth == 0 {
                    return Err(EntryError::ZeroDepth);
                }
                let depth = u32::try_from(depth).map_err(|_| EntryError::DepthOverflow(depth))?;
                rest = &after_key[consumed..];
                EntryKind::Delta { base, depth }
            }
            other => return Err(EntryError::UnknownTag(other)),
        };

        let (len, consumed) = decode_varint(rest)?;
        let rest = &rest[consumed..];
        let len = usize::try_from(len).map_err(|_| EntryError::Truncated("payload"))?;
        if rest.len() < len {
            return Err(EntryError::Truncated("payload"));
        }
        if rest.len() > len {
            return Err(EntryError::TrailingBytes(rest.len() - len));
        }

        Ok(Self {
            kind,
            payload: rest.to_vec(),
        })
    }
}
