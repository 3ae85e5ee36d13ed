//! # omnifs-kernel
//!
//! Single-node virtual filesystem engine.
//!
//! A volume is one backing file holding a header, a fixed-capacity user
//! table, a namespace zone, a change-log zone and a run of fixed-size data
//! blocks. The engine keeps three structures consistent across every
//! operation, including the failure paths:
//! - the free-space bitmap ([`BlockAllocator`])
//! - the directory tree ([`NamespaceTree`])
//! - the bytes written to the backing store
//!
//! Hosts drive it either through the [`FileOps`] trait on a [`Volume`] or
//! through the [`command`] surface.

pub mod command;
pub mod config;
pub mod vfs;

pub use command::{Command, CommandOutput, execute, format_listing, result_code};
pub use config::{ConfigError, VolumeConfig};
pub use vfs::{
    BlockAllocator, ChangeOp, ChangeRecord, DirectoryEntry, EntryKind, ErrorKind, Extent, FileOps,
    FsError, FsResult, NamespaceTree, SharedVolume, UserIndex, UserTable, Volume, VolumeHeader,
    VolumeStats, shared_volume,
};
