//! Content-addressed block store (spec §C1).
//!
//! Blocks are immutable byte strings named by the SHA3-256 digest of their
//! content and persisted one file per digest, sharded by the first byte of
//! the digest so a single directory never holds more than 256 subfolders.
//!
//! `wait_block` gives callers a way to block until a block they don't yet
//! have arrives (pushed locally, or delivered over the wire and handed to
//! [`BlockStore::notify_block`]) instead of polling `has_block` in a loop.
//!
//! [`BlockStore::register_file`]/[`BlockStore::erase_file`] track which file
//! names a block is currently reachable through, so erasing one file never
//! deletes bytes still backing another.

#[macro_use]
extern crate error_chain;

pub mod error;
mod fs;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use meshnet_util::{Digest, BLOCK_SIZE};

pub use fs::{FileSystem, NativeFile, NativeFileSystem};

use error::{StoreErrorKind, StoreResult};

struct State {
    known: HashSet<Digest>,
    /// Which file names each digest is currently reachable through, so
    /// `erase_file` can tell a block with no remaining referrer from one
    /// still backing another file (spec §4.1's file-erasure notification).
    referenced_by: HashMap<Digest, HashSet<String>>,
    files: HashMap<String, HashSet<Digest>>,
}

/// A content-addressed block store backed by a [`FileSystem`].
pub struct BlockStore<F> {
    fs: F,
    state: Mutex<State>,
    arrived: Condvar,
}

impl BlockStore<NativeFileSystem> {
    /// Open (creating if necessary) a block store rooted at `data_dir` on
    /// the native file system.
    pub fn open<P: Into<PathBuf>>(data_dir: P) -> StoreResult<BlockStore<NativeFileSystem>> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir).map_err(|_| StoreErrorKind::BadDataDirectory {
            path: data_dir.clone(),
        })?;
        Ok(BlockStore::with_filesystem(NativeFileSystem::with_directory(data_dir)))
    }
}

impl<F: FileSystem> BlockStore<F> {
    pub fn with_filesystem(fs: F) -> BlockStore<F> {
        BlockStore {
            fs,
            state: Mutex::new(State {
                known: HashSet::new(),
                referenced_by: HashMap::new(),
                files: HashMap::new(),
            }),
            arrived: Condvar::new(),
        }
    }

    /// True if the block is already present.
    pub fn has_block(&self, digest: &Digest) -> bool {
        self.lock().known.contains(digest)
    }

    /// Hash `bytes`, store them under the resulting digest, and return it.
    pub fn push(&self, bytes: &[u8]) -> StoreResult<Digest> {
        let digest = Digest::from_bytes(bytes);
        self.push_expect(&digest, bytes)?;
        Ok(digest)
    }

    /// Store `bytes` under a digest the caller already claims to know,
    /// verifying it actually hashes to that digest before accepting it.
    ///
    /// This is the path used when a block's bytes arrive over the wire
    /// already labeled with the digest the peer requested.
    pub fn push_expect(&self, digest: &Digest, bytes: &[u8]) -> StoreResult<()> {
        if bytes.len() > BLOCK_SIZE {
            return Err(StoreErrorKind::BlockTooLarge {
                digest: *digest,
                len: bytes.len(),
            }
            .into());
        }

        let actual = Digest::from_bytes(bytes);
        if actual != *digest {
            return Err(StoreErrorKind::DigestMismatch {
                expected: *digest,
                actual,
            }
            .into());
        }

        if self.has_block(digest) {
            return Ok(());
        }

        let mut file = self.fs.open_file(path_for(digest))?;
        self.fs.write_file(&mut file, 0, bytes)?;
        self.notify_block(*digest);
        Ok(())
    }

    /// Record that a block has become available without writing it through
    /// `push` (e.g. restoring state at startup, or a future on-disk index
    /// scan). Wakes any thread parked in [`BlockStore::wait_block`].
    pub fn notify_block(&self, digest: Digest) {
        let mut state = self.lock();
        if state.known.insert(digest) {
            drop(state);
            self.arrived.notify_all();
        }
    }

    /// Record that `name` is backed by `digests`, so a later
    /// [`BlockStore::erase_file`] knows which blocks to consider freeing.
    /// Re-registering an existing name replaces its previous digest set.
    pub fn register_file(&self, name: &str, digests: &[Digest]) {
        let mut state = self.lock();
        if let Some(previous) = state.files.remove(name) {
            for digest in previous {
                if let Some(refs) = state.referenced_by.get_mut(&digest) {
                    refs.remove(name);
                }
            }
        }
        state.files.insert(name.to_owned(), digests.iter().copied().collect());
        for digest in digests {
            state.referenced_by.entry(*digest).or_default().insert(name.to_owned());
        }
    }

    /// File erasure notification (spec §4.1): drop every block that was
    /// only reachable through `name`, deleting its backing bytes from disk.
    /// Blocks still referenced by another registered file are left alone.
    pub fn erase_file(&self, name: &str) -> StoreResult<()> {
        let freed: Vec<Digest> = {
            let mut state = self.lock();
            let digests = match state.files.remove(name) {
                Some(digests) => digests,
                None => return Ok(()),
            };
            let mut freed = Vec::new();
            for digest in digests {
                if let Some(refs) = state.referenced_by.get_mut(&digest) {
                    refs.remove(name);
                    if refs.is_empty() {
                        state.referenced_by.remove(&digest);
                        state.known.remove(&digest);
                        freed.push(digest);
                    }
                }
            }
            freed
        };

        for digest in freed {
            self.fs.remove_file(path_for(&digest))?;
        }
        Ok(())
    }

    /// Read a block's bytes, failing immediately if it is not present.
    pub fn get_block(&self, digest: &Digest) -> StoreResult<Vec<u8>> {
        if !self.has_block(digest) {
            return Err(StoreErrorKind::BlockNotFound { digest: *digest }.into());
        }
        self.read_from_disk(digest)
    }

    /// Alias for [`BlockStore::get_block`], matching the pull/push naming
    /// pair used by callers of the store.
    pub fn pull(&self, digest: &Digest) -> StoreResult<Vec<u8>> {
        self.get_block(digest)
    }

    /// Block the calling thread until `digest` becomes available or
    /// `timeout` elapses.
    pub fn wait_block(&self, digest: &Digest, timeout: Duration) -> StoreResult<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while !state.known.contains(digest) {
            let now = Instant::now();
            if now >= deadline {
                return Err(StoreErrorKind::WaitTimedOut { digest: *digest }.into());
            }
            let (guard, result) = self
                .arrived
                .wait_timeout(state, deadline - now)
                .expect("meshnet-store: block store condvar poisoned");
            state = guard;
            if result.timed_out() && !state.known.contains(digest) {
                return Err(StoreErrorKind::WaitTimedOut { digest: *digest }.into());
            }
        }
        drop(state);
        self.read_from_disk(digest)
    }

    fn read_from_disk(&self, digest: &Digest) -> StoreResult<Vec<u8>> {
        let mut file = self.fs.open_file(path_for(digest))?;
        let size = self.fs.file_size(&file)? as usize;
        let mut buffer = vec![0u8; size];
        let mut read = 0;
        while read < size {
            let n = self.fs.read_file(&mut file, read as u64, &mut buffer[read..])?;
            if n == 0 {
                break;
            }
            read += n;
        }
        buffer.truncate(read);
        Ok(buffer)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state
            .lock()
            .expect("meshnet-store: block store mutex poisoned")
    }
}

fn path_for(digest: &Digest) -> PathBuf {
    let hex = digest.to_string();
    let mut path = PathBuf::new();
    path.push(&hex[0..2]);
    path.push(&hex[2..]);
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn store() -> (tempfile::TempDir, BlockStore<NativeFileSystem>) {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn positive_push_then_get() {
        let (_dir, store) = store();
        let digest = store.push(b"hello world").unwrap();
        assert!(store.has_block(&digest));
        assert_eq!(store.get_block(&digest).unwrap(), b"hello world");
    }

    #[test]
    fn negative_get_missing_block() {
        let (_dir, store) = store();
        let digest = Digest::zero();
        assert!(store.get_block(&digest).is_err());
    }

    #[test]
    fn negative_push_expect_digest_mismatch() {
        let (_dir, store) = store();
        let wrong_digest = Digest::from_bytes(b"not the real content");
        let err = store.push_expect(&wrong_digest, b"actual content");
        assert!(err.is_err());
    }

    #[test]
    fn positive_wait_block_unblocks_on_push() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(BlockStore::open(dir.path()).unwrap());
        let digest = Digest::from_bytes(b"delayed");

        let waiter = {
            let store = store.clone();
            thread::spawn(move || store.wait_block(&digest, Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(20));
        store.push_expect(&digest, b"delayed").unwrap();

        let bytes = waiter.join().unwrap().unwrap();
        assert_eq!(bytes, b"delayed");
    }

    #[test]
    fn positive_erase_file_drops_unreferenced_block() {
        let (_dir, store) = store();
        let digest = store.push(b"only in this file").unwrap();
        store.register_file("a.bin", &[digest]);

        store.erase_file("a.bin").unwrap();

        assert!(!store.has_block(&digest));
        assert!(store.get_block(&digest).is_err());
    }

    #[test]
    fn positive_erase_file_keeps_block_shared_with_another_file() {
        let (_dir, store) = store();
        let digest = store.push(b"shared bytes").unwrap();
        store.register_file("a.bin", &[digest]);
        store.register_file("b.bin", &[digest]);

        store.erase_file("a.bin").unwrap();

        assert!(store.has_block(&digest));
        assert_eq!(store.get_block(&digest).unwrap(), b"shared bytes");

        store.erase_file("b.bin").unwrap();
        assert!(!store.has_block(&digest));
    }

    #[test]
    fn negative_erase_unknown_file_is_a_no_op() {
        let (_dir, store) = store();
        assert!(store.erase_file("never-registered.bin").is_ok());
    }

    #[test]
    fn negative_wait_block_times_out() {
        let (_dir, store) = store();
        let digest = Digest::from_bytes(b"never arrives");
        let result = store.wait_block(&digest, Duration::from_millis(30));
        assert!(result.is_err());
    }
}
