//! Wire codec for the replicated-log substrate.
//!
//! The layout is hand-rolled rather than derived: length-prefixed fields,
//! tag-first unions, nothing that depends on struct field order at the
//! language level. Canonical byte layout matters here because entry hashes
//! are computed over it.

pub mod codec;
pub mod hash;
pub mod header;
pub mod message;

pub use codec::{Decode, Encode};
pub use hash::Hash;
pub use header::Header;
pub use message::{DeliveryMode, Message, MessageBody};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("buffer underrun decoding {field}")]
    Underrun { field: &'static str },
    #[error("invalid tag byte {tag} decoding {what}")]
    InvalidTag { tag: u8, what: &'static str },
    #[error("field {field} exceeded maximum length {max}")]
    TooLong { field: &'static str, max: usize },
    #[error("trailing bytes after decoding a complete message")]
    TrailingBytes,
    #[error("field {field} is not valid utf-8")]
    InvalidUtf8 { field: &'static str },
}

pub type Result<T> = std::result::Result<T, Error>;
