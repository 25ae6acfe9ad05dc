//! Foundation types for zstore.
//!
//! Every other zstore crate depends on `zstore-types` for the identifier
//! under which content is stored.
//!
//! # Key Types
//!
//! - [`ContentKey`] -- Content-addressed identifier (domain-separated BLAKE3 hash)
//! - [`TypeError`] -- Parsing failures for keys supplied as hex or raw bytes

pub mod error;
pub mod key;

pub use error::TypeError;
pub use key::{ContentKey, KEY_LEN};
