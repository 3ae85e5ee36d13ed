//! Core entry types.
//!
//! These are the records the namespace tree stores and persists. A file's
//! physical placement is its [`Extent`]; the [`Inode`] is identity only.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use omnifs_types::{Inode, unix_now};

/// Permission mode for new files.
pub const FILE_MODE: u32 = 0o644;

/// Permission mode for new directories.
pub const DIR_MODE: u32 = 0o755;

/// Owner recorded on directories created without an acting user.
pub const ROOT_OWNER: &str = "root";

/// Entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl EntryKind {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, EntryKind::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, EntryKind::Directory)
    }
}

/// Contiguous block range holding a file's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Extent {
    pub first_block: u64,
    pub block_count: u64,
}

impl Extent {
    /// The extent of a zero-length file: owns no blocks.
    pub const EMPTY: Extent = Extent {
        first_block: 0,
        block_count: 0,
    };

    pub fn new(first_block: u64, block_count: u64) -> Self {
        Self {
            first_block,
            block_count,
        }
    }

    /// Block indices covered by this extent.
    pub fn blocks(&self) -> std::ops::Range<u64> {
        self.first_block..self.first_block + self.block_count
    }

    pub fn is_empty(&self) -> bool {
        self.block_count == 0
    }
}

/// Directory entry: a file, or the placeholder for an immediate subdirectory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Entry name (not full path).
    pub name: String,
    pub kind: EntryKind,
    /// Size in bytes; zero for directories.
    pub size: u64,
    /// Unix permissions (e.g., 0o644).
    pub mode: u32,
    /// Owning username.
    pub owner: String,
    pub inode: Inode,
    /// Present for files only.
    pub extent: Option<Extent>,
    /// Unix seconds.
    pub created_at: u64,
    /// Unix seconds.
    pub modified_at: u64,
}

impl DirectoryEntry {
    /// Create a file entry.
    pub fn file(
        name: impl Into<String>,
        size: u64,
        owner: impl Into<String>,
        inode: Inode,
        extent: Extent,
    ) -> Self {
        let now = unix_now();
        Self {
            name: name.into(),
            kind: EntryKind::File,
            size,
            mode: FILE_MODE,
            owner: owner.into(),
            inode,
            extent: Some(extent),
            created_at: now,
            modified_at: now,
        }
    }

    /// Create a directory placeholder entry.
    pub fn directory(name: impl Into<String>, owner: impl Into<String>, inode: Inode) -> Self {
        let now = unix_now();
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
            size: 0,
            mode: DIR_MODE,
            owner: owner.into(),
            inode,
            extent: None,
            created_at: now,
            modified_at: now,
        }
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Blocks owned by this entry (zero for directories).
    pub fn block_count(&self) -> u64 {
        self.extent.map(|e| e.block_count).unwrap_or(0)
    }
}

/// Volume statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeStats {
    pub volume_id: Uuid,
    pub total_blocks: u64,
    pub free_blocks: u64,
    pub block_size: u64,
    pub files: u64,
    pub directories: u64,
    pub users: u64,
    /// Unix seconds.
    pub created_at: u64,
}
