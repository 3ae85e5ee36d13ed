//! Inode identifiers.
//!
//! Inodes are opaque: they identify an entry, they never encode where its
//! bytes live. File inodes count up from [`FIRST_FILE_INODE`], directory
//! inodes from [`FIRST_DIR_INODE`]; a file counter that reaches the
//! directory range joins the directory counter. A volume owns its own counters, so two
//! volumes in one process never share a sequence.

use std::fmt;

use serde::{Deserialize, Serialize};

/// First inode handed out to a file on a fresh volume.
pub const FIRST_FILE_INODE: u32 = 1000;

/// First inode handed out to a directory on a fresh volume.
pub const FIRST_DIR_INODE: u32 = 5000;

/// Identifier of a file or directory entry.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inode(u32);

impl Inode {
    /// Wrap a raw inode number.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw inode number.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// The inode after this one.
    ///
    /// Saturates at `u32::MAX`; a volume that exhausts the space keeps
    /// reporting the same value and the caller decides what to do about it.
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Inode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Inode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Inode({})", self.0)
    }
}

impl From<u32> for Inode {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}
