//! Backing-store handle: positional reads and writes on one file.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::error::{FsError, FsResult};

/// Exclusive handle on a volume's backing file.
#[derive(Debug)]
pub struct BackingStore {
    file: File,
    path: PathBuf,
}

impl BackingStore {
    /// Create or truncate `path` and size it to `len` bytes (sparse).
    pub fn create(path: &Path, len: u64) -> FsResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(len)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing file for read/write. A missing file is NotFound.
    pub fn open(path: &Path) -> FsResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => FsError::not_found(format!("volume {}", path.display())),
                _ => FsError::Io(e),
            })?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Read-only handle: every write fails with Io.
    #[cfg(test)]
    pub(crate) fn open_read_only(path: &Path) -> FsResult<Self> {
        Ok(Self {
            file: File::open(path)?,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current length of the backing file.
    pub fn file_len(&self) -> FsResult<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Read exactly `len` bytes at `offset`. A short file is InvalidFormat.
    pub fn read_at(&mut self, offset: u64, len: usize) -> FsResult<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => FsError::invalid_format(format!(
                "{} truncated: wanted {len} bytes at offset {offset}",
                self.path.display()
            )),
            _ => FsError::Io(e),
        })?;
        Ok(buf)
    }

    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> FsResult<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(())
    }

    /// Flush written data to the device.
    pub fn sync(&mut self) -> FsResult<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }
}
