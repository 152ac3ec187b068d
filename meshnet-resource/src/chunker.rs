use std::io::Read;

use meshnet_store::BlockStore;
use meshnet_util::{Digest, BLOCK_SIZE};

use crate::error::ResourceResult;
use crate::record::{EntryKind, IndexRecord};

/// Read `reader` to completion, splitting it into `BLOCK_SIZE` blocks,
/// pushing each into `store`, and returning an [`IndexRecord`] describing
/// the whole file.
pub fn chunk_into_store<R: Read, F: meshnet_store::FileSystem>(
    name: &str,
    mut reader: R,
    store: &BlockStore<F>,
) -> ResourceResult<IndexRecord> {
    if name.is_empty() {
        return Err(crate::error::ResourceErrorKind::EmptyName.into());
    }

    let mut block_digests = Vec::new();
    let mut total_size: u64 = 0;
    let mut buffer = vec![0u8; BLOCK_SIZE];

    loop {
        let filled = read_fill(&mut reader, &mut buffer)?;
        if filled == 0 {
            break;
        }

        let digest = store.push(&buffer[..filled])?;
        block_digests.push(digest);
        total_size += filled as u64;

        if filled < BLOCK_SIZE {
            break;
        }
    }

    store.register_file(name, &block_digests);

    Ok(IndexRecord {
        name: name.to_owned(),
        kind: EntryKind::File,
        size: total_size,
        block_digests,
    })
}

/// Read until `buffer` is full or the source is exhausted, returning the
/// number of bytes actually filled (`read` alone may return short reads).
fn read_fill<R: Read>(reader: &mut R, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let n = reader.read(&mut buffer[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// The digest a directory entry should carry for bookkeeping purposes: the
/// hash of its own index record bytes.
pub fn index_digest(record: &IndexRecord) -> ResourceResult<Digest> {
    let mut buf = Vec::new();
    record.write_to(&mut buf)?;
    Ok(Digest::from_bytes(&buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshnet_store::NativeFileSystem;
    use std::io::Cursor;

    fn store() -> (tempfile::TempDir, BlockStore<NativeFileSystem>) {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn positive_chunk_single_partial_block() {
        let (_dir, store) = store();
        let data = vec![7u8; 100];
        let record = chunk_into_store("small.bin", Cursor::new(data.clone()), &store).unwrap();

        assert_eq!(record.size, 100);
        assert_eq!(record.block_digests.len(), 1);
        assert_eq!(store.get_block(&record.block_digests[0]).unwrap(), data);
    }

    #[test]
    fn positive_chunk_multiple_full_blocks() {
        let (_dir, store) = store();
        let data = vec![3u8; BLOCK_SIZE * 2 + 17];
        let record = chunk_into_store("big.bin", Cursor::new(data.clone()), &store).unwrap();

        assert_eq!(record.size, data.len() as u64);
        assert_eq!(record.block_digests.len(), 3);
    }

    #[test]
    fn negative_empty_name_rejected() {
        let (_dir, store) = store();
        let result = chunk_into_store("", Cursor::new(vec![1u8; 10]), &store);
        assert!(result.is_err());
    }

    #[test]
    fn positive_empty_input_yields_zero_blocks() {
        let (_dir, store) = store();
        let record = chunk_into_store("empty.bin", Cursor::new(Vec::new()), &store).unwrap();
        assert_eq!(record.size, 0);
        assert!(record.block_digests.is_empty());
    }
}
