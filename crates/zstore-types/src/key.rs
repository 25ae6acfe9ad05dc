use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Width of a [`ContentKey`] in bytes.
pub const KEY_LEN: usize = 32;

/// Domain tag prepended to content before hashing.
///
/// Keeps zstore keys disjoint from plain BLAKE3 digests of the same bytes
/// computed elsewhere in a caller's system.
const CONTENT_DOMAIN: &str = "zstore-content-v1";

/// Content-addressed identifier for a stored entry.
///
/// A `ContentKey` is the domain-separated BLAKE3 hash of an entry's full,
/// reconstructed content. It never depends on how the entry is stored:
/// a snapshot and a delta of the same bytes share one key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentKey([u8; KEY_LEN]);

impl ContentKey {
    /// Derive the key for a piece of content.
    pub fn of(content: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(CONTENT_DOMAIN.as_bytes());
        hasher.update(b":");
        hasher.update(content);
        Self(*hasher.finalize().as_bytes())
    }

    /// Create a `ContentKey` from a pre-computed hash.
    pub const fn from_hash(hash: [u8; KEY_LEN]) -> Self {
        Self(hash)
    }

    /// Create a `ContentKey` from a slice that must be exactly [`KEY_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; KEY_LEN] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: KEY_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Returns `true` if `content` hashes to this key.
    pub fn matches(&self, content: &[u8]) -> bool {
        Self::of(content) == *self
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentKey({})", self.short_hex())
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ContentKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; KEY_LEN]> for ContentKey {
    fn from(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<ContentKey> for [u8; KEY_LEN] {
    fn from(key: ContentKey) -> Self {
        key.0
    }
}
