//! Small shared binary encoding helpers: length-prefixed UTF-8 strings and
//! lists of digests. Used both by the overlay wire format and by the
//! resource index/directory records, since both are specified as "the
//! project's binary serializer (length-prefixed strings and lists)".

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::digest::{Digest, DIGEST_LEN};

/// Write `s` as a `u16` length prefix followed by its UTF-8 bytes.
pub fn write_str<W: Write>(mut writer: W, s: &str) -> io::Result<()> {
    let bytes = s.as_bytes();
    writer.write_u16::<BigEndian>(bytes.len() as u16)?;
    writer.write_all(bytes)
}

/// Read a `u16`-length-prefixed UTF-8 string written by [`write_str`].
pub fn read_str<R: Read>(mut reader: R) -> io::Result<String> {
    let len = reader.read_u16::<BigEndian>()? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Write a digest list as a `u32` count followed by each digest's 32 bytes.
pub fn write_digest_list<W: Write>(mut writer: W, digests: &[Digest]) -> io::Result<()> {
    writer.write_u32::<BigEndian>(digests.len() as u32)?;
    for digest in digests {
        writer.write_all(digest.as_ref())?;
    }
    Ok(())
}

/// Read a digest list written by [`write_digest_list`].
pub fn read_digest_list<R: Read>(mut reader: R) -> io::Result<Vec<Digest>> {
    let count = reader.read_u32::<BigEndian>()? as usize;
    let mut digests = Vec::with_capacity(count);
    let mut buf = [0u8; DIGEST_LEN];
    for _ in 0..count {
        reader.read_exact(&mut buf)?;
        digests.push(Digest::from_array(buf));
    }
    Ok(digests)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_str_round_trip() {
        let mut buf = Vec::new();
        write_str(&mut buf, "/music/rock").unwrap();
        let s = read_str(&buf[..]).unwrap();
        assert_eq!(s, "/music/rock");
    }

    #[test]
    fn positive_empty_str_round_trip() {
        let mut buf = Vec::new();
        write_str(&mut buf, "").unwrap();
        let s = read_str(&buf[..]).unwrap();
        assert_eq!(s, "");
    }

    #[test]
    fn positive_digest_list_round_trip() {
        let digests = vec![Digest::from_bytes(b"a"), Digest::from_bytes(b"b")];
        let mut buf = Vec::new();
        write_digest_list(&mut buf, &digests).unwrap();
        let decoded = read_digest_list(&buf[..]).unwrap();
        assert_eq!(decoded, digests);
    }

    #[test]
    fn positive_empty_digest_list_round_trip() {
        let mut buf = Vec::new();
        write_digest_list(&mut buf, &[]).unwrap();
        let decoded = read_digest_list(&buf[..]).unwrap();
        assert!(decoded.is_empty());
    }
}
