//! File operations engine.
//!
//! The one place that touches all three structures at once. Each operation
//! follows the same shape: resolve and check, claim blocks, update the
//! namespace, encode the metadata, move bytes, write the metadata, sync, and
//! on any failure undo the in-memory changes in reverse order before
//! returning. Encoding comes before the data write so a namespace that no
//! longer fits its zone fails before any file bytes are touched.

use tracing::{debug, error, warn};

use omnifs_types::{Inode, UserRecord, unix_now};

use super::change_log::ChangeOp;
use super::error::{FsError, FsResult};
use super::namespace::NodeId;
use super::ops::FileOps;
use super::types::{DirectoryEntry, Extent, ROOT_OWNER};
use super::volume::{Mounted, Volume};

impl FileOps for Volume {
    #[tracing::instrument(
        skip(self, data, owner),
        name = "fs.create",
        fields(len = data.len(), owner = %owner.username)
    )]
    fn create_file(&mut self, path: &str, data: &[u8], owner: &UserRecord) -> FsResult<Inode> {
        self.mounted_mut()?.create_file(path, data, owner)
    }

    #[tracing::instrument(
        skip(self, requester),
        name = "fs.read",
        fields(user = %requester.username)
    )]
    fn read_file(&mut self, path: &str, requester: &UserRecord) -> FsResult<Vec<u8>> {
        self.mounted_mut()?.read_file(path, requester)
    }

    #[tracing::instrument(
        skip(self, data, requester),
        name = "fs.edit",
        fields(len = data.len(), user = %requester.username)
    )]
    fn edit_file(&mut self, path: &str, data: &[u8], requester: &UserRecord) -> FsResult<()> {
        self.mounted_mut()?.edit_file(path, data, requester)
    }

    #[tracing::instrument(
        skip(self, requester),
        name = "fs.delete",
        fields(user = %requester.username)
    )]
    fn delete_file(&mut self, path: &str, requester: &UserRecord) -> FsResult<()> {
        self.mounted_mut()?.delete_file(path, requester)
    }

    #[tracing::instrument(skip(self), name = "fs.mkdir")]
    fn create_directory(&mut self, path: &str) -> FsResult<Inode> {
        self.mounted_mut()?.create_directory(path)
    }

    fn list_directory(&self, path: &str) -> FsResult<Vec<DirectoryEntry>> {
        let mounted = self.mounted()?;
        let dir = mounted.namespace.resolve_directory(path)?;
        Ok(mounted
            .namespace
            .node(dir)
            .map(|node| node.entries().to_vec())
            .unwrap_or_default())
    }

    #[tracing::instrument(skip(self), name = "fs.rmdir")]
    fn delete_directory(&mut self, path: &str) -> FsResult<()> {
        self.mounted_mut()?.delete_directory(path)
    }
}

fn check_access(requester: &UserRecord, entry: &DirectoryEntry, path: &str) -> FsResult<()> {
    if requester.may_access(&entry.owner) {
        return Ok(());
    }
    warn!(path, user = %requester.username, owner = %entry.owner, "permission denied");
    Err(FsError::permission_denied(format!(
        "{} may not access {path}",
        requester.username
    )))
}

fn extent_of(entry: &DirectoryEntry) -> FsResult<Extent> {
    entry
        .extent
        .ok_or_else(|| FsError::invalid_format(format!("file {} has no extent", entry.name)))
}

impl Mounted {
    /// Resolve a file entry; directories and missing names are NotFound.
    fn lookup_file<'p>(&self, path: &'p str) -> FsResult<(NodeId, &'p str, DirectoryEntry)> {
        let (dir, name) = self.namespace.resolve_parent(path)?;
        let entry = self
            .namespace
            .find_file_entry(dir, name)
            .cloned()
            .ok_or_else(|| FsError::not_found(format!("file {path}")))?;
        Ok((dir, name, entry))
    }

    /// First-fit claim of `blocks` contiguous blocks. Zero blocks is the
    /// empty extent.
    fn claim_run(&mut self, blocks: u64) -> FsResult<Extent> {
        if blocks == 0 {
            return Ok(Extent::EMPTY);
        }
        let Some(first) = self.allocator.find_free_run(blocks) else {
            warn!(
                blocks,
                free = self.allocator.count_free(),
                "no contiguous run available"
            );
            return Err(FsError::out_of_space(format!("no run of {blocks} free blocks")));
        };
        let extent = Extent::new(first, blocks);
        self.allocator.allocate(extent);
        Ok(extent)
    }

    fn create_file(&mut self, path: &str, data: &[u8], owner: &UserRecord) -> FsResult<Inode> {
        let (dir, name) = self.namespace.resolve_parent(path)?;
        if self.namespace.find_entry(dir, name).is_some() {
            return Err(FsError::already_exists(path.to_string()));
        }

        let size = data.len() as u64;
        let extent = self.claim_run(self.header.blocks_for(size))?;
        let inode = self.header.take_file_inode();
        let entry = DirectoryEntry::file(name, size, owner.username.clone(), inode, extent);
        if let Err(e) = self.namespace.add_file(dir, entry) {
            self.allocator.release(extent);
            return Err(e);
        }

        let staged = match self.stage_metadata() {
            Ok(staged) => staged,
            Err(e) => {
                self.undo_create(dir, name, extent);
                return Err(e);
            }
        };
        if let Err(e) = self.write_extent(extent, data) {
            self.undo_create(dir, name, extent);
            return Err(e);
        }
        if let Err(e) = self.write_metadata(&staged) {
            self.undo_create(dir, name, extent);
            self.restore_metadata();
            return Err(e);
        }

        self.store.sync()?;
        self.record(ChangeOp::CreateFile, path, &owner.username);
        debug!(
            path,
            %inode,
            first_block = extent.first_block,
            blocks = extent.block_count,
            "created file"
        );
        Ok(inode)
    }

    fn undo_create(&mut self, dir: NodeId, name: &str, extent: Extent) {
        if let Err(e) = self.namespace.remove_file(dir, name) {
            error!(name, error = %e, "failed to undo file creation");
        }
        self.allocator.release(extent);
    }

    fn read_file(&mut self, path: &str, requester: &UserRecord) -> FsResult<Vec<u8>> {
        let (_, _, entry) = self.lookup_file(path)?;
        check_access(requester, &entry, path)?;
        let data = self.read_extent(extent_of(&entry)?, entry.size)?;
        debug!(path, size = entry.size, "read file");
        Ok(data)
    }

    fn edit_file(&mut self, path: &str, data: &[u8], requester: &UserRecord) -> FsResult<()> {
        let (dir, name, entry) = self.lookup_file(path)?;
        check_access(requester, &entry, path)?;
        let old = extent_of(&entry)?;
        let size = data.len() as u64;

        // The old blocks count as free while searching, so a file can be
        // rewritten in place.
        self.allocator.release(old);
        let new = match self.claim_run(self.header.blocks_for(size)) {
            Ok(extent) => extent,
            Err(e) => {
                self.allocator.allocate(old);
                warn!(path, "edit rolled back, old extent kept");
                return Err(e);
            }
        };
        if let Some(live) = self.namespace.find_file_entry_mut(dir, name) {
            live.size = size;
            live.extent = Some(new);
            live.modified_at = unix_now();
        }

        // The new run may overlap the old one, so nothing is written until
        // the metadata is known to fit.
        let staged = match self.stage_metadata() {
            Ok(staged) => staged,
            Err(e) => {
                self.undo_edit(dir, &entry, old, new);
                warn!(path, error = %e, "edit rolled back, old content kept");
                return Err(e);
            }
        };
        if let Err(e) = self.write_extent(new, data) {
            self.undo_edit(dir, &entry, old, new);
            error!(path, error = %e, "write failed during edit");
            return Err(e);
        }
        if let Err(e) = self.write_metadata(&staged) {
            self.undo_edit(dir, &entry, old, new);
            self.restore_metadata();
            return Err(e);
        }

        self.store.sync()?;
        self.record(ChangeOp::EditFile, path, &requester.username);
        debug!(
            path,
            size,
            first_block = new.first_block,
            blocks = new.block_count,
            "edited file"
        );
        Ok(())
    }

    fn undo_edit(&mut self, dir: NodeId, entry: &DirectoryEntry, old: Extent, new: Extent) {
        if let Some(live) = self.namespace.find_file_entry_mut(dir, &entry.name) {
            *live = entry.clone();
        }
        self.allocator.release(new);
        self.allocator.allocate(old);
    }

    fn delete_file(&mut self, path: &str, requester: &UserRecord) -> FsResult<()> {
        let (dir, name, entry) = self.lookup_file(path)?;
        check_access(requester, &entry, path)?;
        let extent = extent_of(&entry)?;

        self.namespace.remove_file(dir, name)?;
        self.allocator.release(extent);
        if let Err(e) = self.commit_metadata() {
            self.allocator.allocate(extent);
            if let Err(undo) = self.namespace.add_file(dir, entry) {
                error!(path, error = %undo, "failed to restore deleted entry");
            }
            self.restore_metadata();
            return Err(e);
        }

        self.store.sync()?;
        self.record(ChangeOp::DeleteFile, path, &requester.username);
        debug!(path, blocks = extent.block_count, "deleted file");
        Ok(())
    }

    fn create_directory(&mut self, path: &str) -> FsResult<Inode> {
        let (parent, name) = self.namespace.resolve_parent(path)?;
        if self.namespace.find_entry(parent, name).is_some() {
            return Err(FsError::already_exists(path.to_string()));
        }

        let inode = self.header.take_dir_inode();
        self.namespace.add_subdirectory(parent, name, inode, ROOT_OWNER)?;
        if let Err(e) = self.commit_metadata() {
            if let Err(undo) = self.namespace.remove_subdirectory(parent, name) {
                error!(path, error = %undo, "failed to undo directory creation");
            }
            self.restore_metadata();
            return Err(e);
        }

        self.store.sync()?;
        self.record(ChangeOp::CreateDirectory, path, ROOT_OWNER);
        debug!(path, %inode, "created directory");
        Ok(inode)
    }

    fn delete_directory(&mut self, path: &str) -> FsResult<()> {
        let (parent, name) = self.namespace.resolve_parent(path)?;
        let entry = self.namespace.remove_subdirectory(parent, name)?;
        if let Err(e) = self.commit_metadata() {
            if let Err(undo) = self
                .namespace
                .add_subdirectory(parent, name, entry.inode, &entry.owner)
            {
                error!(path, error = %undo, "failed to restore directory");
            }
            self.restore_metadata();
            return Err(e);
        }

        self.store.sync()?;
        self.record(ChangeOp::DeleteDirectory, path, ROOT_OWNER);
        debug!(path, "deleted directory");
        Ok(())
    }
}
