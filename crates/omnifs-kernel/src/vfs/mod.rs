//! Block-structured virtual filesystem.
//!
//! Key components, leaf first:
//!
//! - [`BlockAllocator`] - first-fit bitmap over the data blocks
//! - [`UserTable`] / [`UserIndex`] - user records and their hash index
//! - [`NamespaceTree`] - arena-backed directory hierarchy
//! - [`Volume`] - header, backing store and lifecycle (format/init/shutdown)
//! - [`FileOps`] - the file verbs, implemented for [`Volume`]
//!
//! ## Design Decisions
//!
//! - **Explicit extents**: a file's placement is the `Extent` in its entry.
//!   Inodes are identity only, never block addresses.
//! - **Allocator is derived**: the bitmap is not stored. `init` replays the
//!   extents of the persisted namespace and rejects overlaps.
//! - **Contiguous only**: a file occupies one run of blocks. A request that
//!   no single run satisfies is OutOfSpace even if enough blocks are free.
//! - **Write-through**: metadata is encoded and checked against its zone
//!   first, then data and metadata are written and synced before each
//!   mutating call returns.

mod allocator;
mod change_log;
mod engine;
mod error;
pub mod layout;
mod namespace;
mod ops;
mod store;
mod types;
mod users;
mod volume;

pub use allocator::BlockAllocator;
pub use change_log::{ChangeLog, ChangeOp, ChangeRecord};
pub use error::{ErrorKind, FsError, FsResult};
pub use layout::VolumeHeader;
pub use namespace::{
    DirectoryNode, MAX_NAME_LEN, NamespaceTree, NodeId, NodeSnapshot, split_path, validate_name,
};
pub use ops::FileOps;
pub use store::BackingStore;
pub use types::{DIR_MODE, DirectoryEntry, EntryKind, Extent, FILE_MODE, ROOT_OWNER, VolumeStats};
pub use users::{DEFAULT_INDEX_CAPACITY, UserIndex, UserTable};
pub use volume::{SharedVolume, Volume, shared_volume};
