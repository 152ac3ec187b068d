use std::fmt;

use crate::error::{UtilError, UtilErrorKind, UtilResult};

/// Length in bytes of an [`Identifier`].
pub const IDENTIFIER_LEN: usize = 32;

/// Opaque 32-byte peer name: the hash of a peer's long-term public key.
///
/// Equality is byte equality. [`Identifier::null`] marks "any" and is used
/// as a wildcard destination in routed messages.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier([u8; IDENTIFIER_LEN]);

impl Identifier {
    pub fn from_array(bytes: [u8; IDENTIFIER_LEN]) -> Identifier {
        Identifier(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> UtilResult<Identifier> {
        if bytes.len() != IDENTIFIER_LEN {
            return Err(UtilErrorKind::BadLength {
                expected: IDENTIFIER_LEN,
                actual: bytes.len(),
            }
            .into());
        }

        let mut id = [0u8; IDENTIFIER_LEN];
        id.copy_from_slice(bytes);
        Ok(Identifier(id))
    }

    /// The distinguished "any" identifier: all-zero bytes.
    pub fn null() -> Identifier {
        Identifier([0u8; IDENTIFIER_LEN])
    }

    pub fn is_null(&self) -> bool {
        self.0 == [0u8; IDENTIFIER_LEN]
    }

    pub fn as_bytes(&self) -> &[u8; IDENTIFIER_LEN] {
        &self.0
    }
}

impl AsRef<[u8]> for Identifier {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; IDENTIFIER_LEN]> for Identifier {
    fn from(bytes: [u8; IDENTIFIER_LEN]) -> Identifier {
        Identifier(bytes)
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier(")?;
        for byte in &self.0[..4] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "..)")
    }
}

impl fmt::Display for Identifier {
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
    fn positive_null_is_all_zero() {
        assert!(Identifier::null().is_null());
    }

    #[test]
    fn negative_nonzero_is_not_null() {
        let mut bytes = [0u8; IDENTIFIER_LEN];
        bytes[0] = 1;
        assert!(!Identifier::from_array(bytes).is_null());
    }

    #[test]
    fn negative_from_slice_wrong_length() {
        assert!(Identifier::from_slice(&[0u8; 10]).is_err());
    }
}
