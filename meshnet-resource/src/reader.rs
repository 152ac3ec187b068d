use std::io::{self, Read, Seek, SeekFrom};
use std::time::Duration;

use meshnet_store::{BlockStore, FileSystem};
use meshnet_util::{Digest, BLOCK_SIZE};

use crate::error::{ResourceError, ResourceErrorKind};
use crate::record::IndexRecord;

/// How long [`Reader::read`] blocks on the store for a block it doesn't yet
/// have locally before giving up (spec §4.2 step 2, §5's suspension-point
/// requirement).
pub const DEFAULT_BLOCK_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// A seekable reader over a chunked resource's blocks.
///
/// Seeking is O(1): the target block is `offset / BLOCK_SIZE`, found by
/// direct indexing into `block_digests` rather than scanning from the
/// start, unlike a reader built over a plain concatenated stream.
///
/// Reads past the edge of what's locally available suspend on the store
/// (via [`BlockStore::wait_block`]) rather than failing immediately; it is
/// the caller's job to have already issued a `Call` for the missing digest
/// (e.g. through [`crate::chunker`]'s sibling fetch path on `Node`) so the
/// wait has something to wake up for.
pub struct Reader<'a, F> {
    store: &'a BlockStore<F>,
    block_digests: &'a [Digest],
    size: u64,
    position: u64,
    current_block: Option<(usize, Vec<u8>)>,
    timeout: Duration,
}

impl<'a, F: FileSystem> Reader<'a, F> {
    pub fn new(record: &'a IndexRecord, store: &'a BlockStore<F>) -> Reader<'a, F> {
        Reader::with_timeout(record, store, DEFAULT_BLOCK_WAIT_TIMEOUT)
    }

    pub fn with_timeout(record: &'a IndexRecord, store: &'a BlockStore<F>, timeout: Duration) -> Reader<'a, F> {
        Reader {
            store,
            block_digests: &record.block_digests,
            size: record.size,
            position: 0,
            current_block: None,
            timeout,
        }
    }

    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    fn ensure_block(&mut self, index: usize) -> io::Result<()> {
        if let Some((loaded, _)) = &self.current_block {
            if *loaded == index {
                return Ok(());
            }
        }

        let digest = self.block_digests.get(index).copied().ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "block index past end of resource")
        })?;
        let bytes = self
            .store
            .wait_block(&digest, self.timeout)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        self.current_block = Some((index, bytes));
        Ok(())
    }
}

impl<'a, F: FileSystem> Read for Reader<'a, F> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.position >= self.size || buf.is_empty() {
            return Ok(0);
        }

        let block_index = (self.position / BLOCK_SIZE as u64) as usize;
        let block_offset = (self.position % BLOCK_SIZE as u64) as usize;
        self.ensure_block(block_index)?;

        let block = &self.current_block.as_ref().unwrap().1;
        let available = block.len() - block_offset;
        let to_copy = available.min(buf.len());
        buf[..to_copy].copy_from_slice(&block[block_offset..block_offset + to_copy]);
        self.position += to_copy as u64;
        Ok(to_copy)
    }
}

impl<'a, F: FileSystem> Seek for Reader<'a, F> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => self.size as i64 + offset,
            SeekFrom::Current(offset) => self.position as i64 + offset,
        };

        if target < 0 || target as u64 > self.size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                ResourceError::from(ResourceErrorKind::SeekPastEnd {
                    offset: target.max(0) as u64,
                    size: self.size,
                })
                .to_string(),
            ));
        }

        self.position = target as u64;
        Ok(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::chunk_into_store;
    use meshnet_store::NativeFileSystem;
    use std::io::Cursor;

    fn store() -> (tempfile::TempDir, BlockStore<NativeFileSystem>) {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn positive_sequential_read_matches_original() {
        let (_dir, store) = store();
        let data: Vec<u8> = (0..(BLOCK_SIZE * 2 + 50)).map(|i| (i % 251) as u8).collect();
        let record = chunk_into_store("f.bin", Cursor::new(data.clone()), &store).unwrap();

        let mut reader = Reader::new(&record, &store);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn positive_seek_into_second_block() {
        let (_dir, store) = store();
        let data: Vec<u8> = (0..(BLOCK_SIZE * 2)).map(|i| (i % 251) as u8).collect();
        let record = chunk_into_store("f.bin", Cursor::new(data.clone()), &store).unwrap();

        let mut reader = Reader::new(&record, &store);
        reader.seek(SeekFrom::Start(BLOCK_SIZE as u64 + 5)).unwrap();
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte).unwrap();
        assert_eq!(byte[0], data[BLOCK_SIZE + 5]);
    }

    #[test]
    fn positive_read_suspends_until_block_arrives() {
        let (_dir, store) = store();
        let store = std::sync::Arc::new(store);
        let data = vec![9u8; 10];
        let digest = meshnet_util::Digest::from_bytes(&data);
        let record = IndexRecord {
            name: "pending.bin".to_owned(),
            kind: crate::record::EntryKind::File,
            size: data.len() as u64,
            block_digests: vec![digest],
        };

        let mut reader = Reader::with_timeout(&record, &store, std::time::Duration::from_secs(5));

        let pusher_store = store.clone();
        let pusher_data = data.clone();
        let pusher = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            pusher_store.push_expect(&digest, &pusher_data).unwrap();
        });

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
        pusher.join().unwrap();
    }

    #[test]
    fn negative_read_times_out_when_block_never_arrives() {
        let (_dir, store) = store();
        let digest = meshnet_util::Digest::from_bytes(b"never pushed");
        let record = IndexRecord {
            name: "missing.bin".to_owned(),
            kind: crate::record::EntryKind::File,
            size: 10,
            block_digests: vec![digest],
        };

        let mut reader = Reader::with_timeout(&record, &store, std::time::Duration::from_millis(50));
        let mut out = Vec::new();
        assert!(reader.read_to_end(&mut out).is_err());
    }

    #[test]
    fn negative_seek_past_end_errors() {
        let (_dir, store) = store();
        let record = chunk_into_store("f.bin", Cursor::new(vec![1u8; 10]), &store).unwrap();
        let mut reader = Reader::new(&record, &store);
        assert!(reader.seek(SeekFrom::Start(100)).is_err());
    }
}
