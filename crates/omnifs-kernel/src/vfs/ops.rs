//! File operations trait.
//!
//! The verbs a host drives against one live volume. Paths are absolute and
//! `/`-separated. The acting user is passed in already resolved; the engine
//! only applies the access rule (owner or administrator).

use omnifs_types::{Inode, UserRecord};

use super::error::FsResult;
use super::types::DirectoryEntry;

/// Core file operations.
///
/// Every call either completes with its writes synced or fails leaving
/// allocator and namespace as they were. The exception is an Io error from
/// the final sync: the change is applied in memory and written, but may not
/// be durable, and no change record is appended for it.
pub trait FileOps {
    // ========================================================================
    // Files
    // ========================================================================

    /// Create a file holding `data`, owned by `owner`.
    ///
    /// NotFound if the parent is missing, AlreadyExists if the parent holds
    /// any entry of that name, OutOfSpace if no contiguous run fits.
    fn create_file(&mut self, path: &str, data: &[u8], owner: &UserRecord) -> FsResult<Inode>;

    /// Read a whole file. Does not change volume state.
    fn read_file(&mut self, path: &str, requester: &UserRecord) -> FsResult<Vec<u8>>;

    /// Replace a file's content. On OutOfSpace the old content and
    /// allocation are kept.
    fn edit_file(&mut self, path: &str, data: &[u8], requester: &UserRecord) -> FsResult<()>;

    /// Remove a file and free its blocks.
    fn delete_file(&mut self, path: &str, requester: &UserRecord) -> FsResult<()>;

    // ========================================================================
    // Directories
    // ========================================================================

    /// Create an empty directory owned by `root`.
    fn create_directory(&mut self, path: &str) -> FsResult<Inode>;

    /// Entries of a directory in creation order.
    fn list_directory(&self, path: &str) -> FsResult<Vec<DirectoryEntry>>;

    /// Remove an empty directory. NotEmpty if it holds anything.
    fn delete_directory(&mut self, path: &str) -> FsResult<()>;
}
