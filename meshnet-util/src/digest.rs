use std::fmt;

use sha3::{Digest as _, Sha3_256};

use crate::error::{UtilError, UtilErrorKind, UtilResult};

/// Length in bytes of a [`Digest`], the content hash naming a `Block`.
pub const DIGEST_LEN: usize = 32;

/// 32-byte SHA3-256 content digest.
///
/// Two blocks with the same bytes always produce the same `Digest`;
/// collision resistance is assumed, never checked.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Hash `bytes` and wrap the result.
    pub fn from_bytes(bytes: &[u8]) -> Digest {
        let mut hasher = Sha3_256::new();
        hasher.update(bytes);
        let out = hasher.finalize();

        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&out);
        Digest(digest)
    }

    /// Wrap an already-computed 32-byte hash.
    pub fn from_array(bytes: [u8; DIGEST_LEN]) -> Digest {
        Digest(bytes)
    }

    /// Build a `Digest` from a slice, failing if it isn't exactly
    /// [`DIGEST_LEN`] bytes long.
    pub fn from_slice(bytes: &[u8]) -> UtilResult<Digest> {
        if bytes.len() != DIGEST_LEN {
            return Err(UtilErrorKind::BadLength {
                expected: DIGEST_LEN,
                actual: bytes.len(),
            }
            .into());
        }

        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(bytes);
        Ok(Digest(digest))
    }

    /// All-zero digest. Not the hash of any real block; used as a sentinel
    /// in tests and empty-resource index records.
    pub fn zero() -> Digest {
        Digest([0u8; DIGEST_LEN])
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn into_array(self) -> [u8; DIGEST_LEN] {
        self.0
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; DIGEST_LEN]> for Digest {
    fn from(bytes: [u8; DIGEST_LEN]) -> Digest {
        Digest(bytes)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest(")?;
        for byte in &self.0[..4] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "..)")
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_same_bytes_same_digest() {
        let a = Digest::from_bytes(b"hello world");
        let b = Digest::from_bytes(b"hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn positive_different_bytes_different_digest() {
        let a = Digest::from_bytes(b"hello world");
        let b = Digest::from_bytes(b"hello worlds");
        assert_ne!(a, b);
    }

    #[test]
    fn negative_from_slice_wrong_length() {
        assert!(Digest::from_slice(&[0u8; 31]).is_err());
        assert!(Digest::from_slice(&[0u8; 33]).is_err());
    }

    #[test]
    fn positive_from_slice_round_trip() {
        let original = Digest::from_bytes(b"round trip");
        let rebuilt = Digest::from_slice(original.as_ref()).unwrap();
        assert_eq!(original, rebuilt);
    }
}
