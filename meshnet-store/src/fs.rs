use std::borrow::Cow;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Trait for performing operations on some file system.
///
/// Relative paths originate from an implementation-defined base directory.
/// Abstracting over this (rather than calling `std::fs` directly from the
/// store) is what lets tests substitute an in-memory filesystem.
pub trait FileSystem {
    type File;

    /// Open a file, creating it (and any missing parent directories) if it
    /// does not exist.
    fn open_file<P>(&self, path: P) -> io::Result<Self::File>
    where
        P: AsRef<Path>;

    /// Get the size of the file in bytes.
    fn file_size(&self, file: &Self::File) -> io::Result<u64>;

    /// Read from the file at the given offset, returning the number of
    /// bytes read.
    fn read_file(&self, file: &mut Self::File, offset: u64, buffer: &mut [u8])
        -> io::Result<usize>;

    /// Write to the file at the given offset, returning the number of bytes
    /// written.
    fn write_file(&self, file: &mut Self::File, offset: u64, buffer: &[u8]) -> io::Result<usize>;

    /// Remove a file by path, ignoring a missing file.
    fn remove_file<P>(&self, path: P) -> io::Result<()>
    where
        P: AsRef<Path>;
}

/// File system that maps to the OS file system rooted at a base directory.
pub struct NativeFileSystem {
    base_dir: PathBuf,
}

pub struct NativeFile {
    file: File,
}

impl NativeFileSystem {
    pub fn with_directory<P: AsRef<Path>>(base_dir: P) -> NativeFileSystem {
        NativeFileSystem {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    fn combine(&self, path: &Path) -> Cow<'_, Path> {
        if path.is_absolute() {
            Cow::Borrowed(path)
        } else {
            let mut combined = self.base_dir.clone();
            for piece in path.iter() {
                combined.push(piece);
            }
            Cow::Owned(combined)
        }
    }
}

impl FileSystem for NativeFileSystem {
    type File = NativeFile;

    fn open_file<P>(&self, path: P) -> io::Result<NativeFile>
    where
        P: AsRef<Path>,
    {
        let combined = self.combine(path.as_ref());
        if let Some(parent) = combined.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&combined)?;
        Ok(NativeFile { file })
    }

    fn file_size(&self, file: &NativeFile) -> io::Result<u64> {
        file.file.metadata().map(|metadata| metadata.len())
    }

    fn read_file(
        &self,
        file: &mut NativeFile,
        offset: u64,
        buffer: &mut [u8],
    ) -> io::Result<usize> {
        file.file.seek(SeekFrom::Start(offset))?;
        file.file.read(buffer)
    }

    fn write_file(&self, file: &mut NativeFile, offset: u64, buffer: &[u8]) -> io::Result<usize> {
        file.file.seek(SeekFrom::Start(offset))?;
        file.file.write(buffer)
    }

    fn remove_file<P>(&self, path: P) -> io::Result<()>
    where
        P: AsRef<Path>,
    {
        let combined = self.combine(path.as_ref());
        match fs::remove_file(combined) {
            Ok(()) => Ok(()),
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
