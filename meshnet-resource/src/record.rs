use std::cmp::Ordering;
use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use meshnet_util::codec::{read_digest_list, read_str, write_digest_list, write_str};
use meshnet_util::Digest;

use crate::error::ResourceResult;

/// Distinguishes a directory entry's kind, mirroring the two record shapes
/// a listing can hold.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EntryKind {
    File = 0,
    Directory = 1,
}

impl EntryKind {
    fn from_byte(byte: u8) -> ResourceResult<EntryKind> {
        Ok(match byte {
            0 => EntryKind::File,
            1 => EntryKind::Directory,
            other => {
                return Err(format!("unknown entry kind byte {}", other).into());
            }
        })
    }

    fn as_byte(self) -> u8 {
        self as u8
    }
}

/// The chunked form of a single file: its block digests in order.
///
/// Total byte size is `size`; the last block may be shorter than
/// `meshnet_util::BLOCK_SIZE`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexRecord {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    pub block_digests: Vec<Digest>,
}

impl IndexRecord {
    pub fn write_to<W: Write>(&self, mut writer: W) -> ResourceResult<()> {
        write_str(&mut writer, &self.name)?;
        writer.write_u8(self.kind.as_byte())?;
        writer.write_u64::<BigEndian>(self.size)?;
        write_digest_list(&mut writer, &self.block_digests)?;
        Ok(())
    }

    pub fn read_from<R: Read>(mut reader: R) -> ResourceResult<IndexRecord> {
        let name = read_str(&mut reader)?;
        let kind = EntryKind::from_byte(reader.read_u8()?)?;
        let size = reader.read_u64::<BigEndian>()?;
        let block_digests = read_digest_list(&mut reader)?;
        Ok(IndexRecord {
            name,
            kind,
            size,
            block_digests,
        })
    }
}

/// One entry in a directory listing: a name, the digest of its index (for a
/// file) or of its own directory listing (for a subdirectory), and a
/// modification time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    pub digest: Digest,
    pub time: i64,
}

impl DirectoryRecord {
    pub fn write_to<W: Write>(&self, mut writer: W) -> ResourceResult<()> {
        write_str(&mut writer, &self.name)?;
        writer.write_u8(self.kind.as_byte())?;
        writer.write_u64::<BigEndian>(self.size)?;
        writer.write_all(self.digest.as_ref())?;
        writer.write_i64::<BigEndian>(self.time)?;
        Ok(())
    }

    pub fn read_from<R: Read>(mut reader: R) -> ResourceResult<DirectoryRecord> {
        let name = read_str(&mut reader)?;
        let kind = EntryKind::from_byte(reader.read_u8()?)?;
        let size = reader.read_u64::<BigEndian>()?;
        let mut digest_buf = [0u8; meshnet_util::DIGEST_LEN];
        reader.read_exact(&mut digest_buf)?;
        let digest = Digest::from_array(digest_buf);
        let time = reader.read_i64::<BigEndian>()?;
        Ok(DirectoryRecord {
            name,
            kind,
            size,
            digest,
            time,
        })
    }

    /// Serialize a whole directory listing as a `u32` count followed by
    /// each record, so the listing itself can be pushed into the block
    /// store under its own digest like any other resource.
    pub fn write_listing<W: Write>(records: &[DirectoryRecord], mut writer: W) -> ResourceResult<()> {
        writer.write_u32::<BigEndian>(records.len() as u32)?;
        for record in records {
            record.write_to(&mut writer)?;
        }
        Ok(())
    }

    pub fn read_listing<R: Read>(mut reader: R) -> ResourceResult<Vec<DirectoryRecord>> {
        let count = reader.read_u32::<BigEndian>()? as usize;
        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            records.push(DirectoryRecord::read_from(&mut reader)?);
        }
        Ok(records)
    }
}

/// Directories sort before files; within the same kind, entries sort by
/// case-insensitive name.
impl Ord for DirectoryRecord {
    fn cmp(&self, other: &DirectoryRecord) -> Ordering {
        let kind_order = |kind: EntryKind| match kind {
            EntryKind::Directory => 0,
            EntryKind::File => 1,
        };
        kind_order(self.kind)
            .cmp(&kind_order(other.kind))
            .then_with(|| self.name.to_lowercase().cmp(&other.name.to_lowercase()))
    }
}

impl PartialOrd for DirectoryRecord {
    fn partial_cmp(&self, other: &DirectoryRecord) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, kind: EntryKind) -> DirectoryRecord {
        DirectoryRecord {
            name: name.to_owned(),
            kind,
            size: 0,
            digest: Digest::zero(),
            time: 0,
        }
    }

    #[test]
    fn positive_index_record_round_trip() {
        let record = IndexRecord {
            name: "song.flac".to_owned(),
            kind: EntryKind::File,
            size: 600_000,
            block_digests: vec![Digest::from_bytes(b"a"), Digest::from_bytes(b"b")],
        };
        let mut buf = Vec::new();
        record.write_to(&mut buf).unwrap();
        let decoded = IndexRecord::read_from(&buf[..]).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn positive_directory_listing_round_trip() {
        let records = vec![
            record("b.txt", EntryKind::File),
            record("sub", EntryKind::Directory),
        ];
        let mut buf = Vec::new();
        DirectoryRecord::write_listing(&records, &mut buf).unwrap();
        let decoded = DirectoryRecord::read_listing(&buf[..]).unwrap();
        assert_eq!(decoded, records);
    }

    #[test]
    fn positive_directories_sort_before_files() {
        let mut records = vec![record("zzz_dir", EntryKind::Directory), record("aaa_file", EntryKind::File)];
        records.sort();
        assert_eq!(records[0].name, "zzz_dir");
    }

    #[test]
    fn positive_case_insensitive_name_order() {
        let mut records = vec![record("Banana", EntryKind::File), record("apple", EntryKind::File)];
        records.sort();
        assert_eq!(records[0].name, "apple");
    }
}
