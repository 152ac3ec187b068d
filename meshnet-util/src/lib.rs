//! Shared primitives used across the meshnet overlay crates: content
//! digests, peer identifiers, and the system-wide size constants.

#[macro_use]
extern crate error_chain;

mod digest;
mod identifier;

pub mod codec;
pub mod error;

pub use digest::{Digest, DIGEST_LEN};
pub use identifier::{Identifier, IDENTIFIER_LEN};

/// Maximum size in bytes of a single block's payload.
pub const BLOCK_SIZE: usize = 256 * 1024;

/// Messages whose `hops` field exceeds this value are dropped rather than
/// forwarded.
pub const MAX_HOPS: u8 = 16;
