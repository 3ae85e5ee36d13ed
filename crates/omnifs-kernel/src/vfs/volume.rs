//! Volume lifecycle and persistence.
//!
//! A [`Volume`] is either unmounted or holds a [`Mounted`] state: the header,
//! the backing store, and the three in-memory structures (block allocator,
//! namespace tree, user table) rebuilt from it. Every operation on an
//! unmounted volume fails InvalidState.
//!
//! Persistence is write-through. After each mutation the affected metadata
//! (namespace snapshot, header, one user slot) is rewritten in place and the
//! store is synced. Only then is the change record appended; it reaches disk
//! with the next sync or at shutdown.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use omnifs_types::{Role, UserRecord, validate_username};

use super::allocator::BlockAllocator;
use super::change_log::{CURSOR_SIZE, ChangeLog, ChangeOp, ChangeRecord};
use super::error::{FsError, FsResult};
use super::layout::{
    HEADER_SIZE, USER_SLOT_SIZE, VolumeHeader, decode_framed, decode_user_slot, encode_framed,
    encode_user_slot,
};
use super::namespace::{NamespaceTree, NodeSnapshot};
use super::store::BackingStore;
use super::types::{Extent, ROOT_OWNER, VolumeStats};
use super::users::UserTable;
use crate::config::VolumeConfig;

/// A volume behind a lock, for hosts that serve concurrent callers.
pub type SharedVolume = Arc<Mutex<Volume>>;

/// Wrap a volume so each engine call runs under one lock.
pub fn shared_volume(volume: Volume) -> SharedVolume {
    Arc::new(Mutex::new(volume))
}

/// State of an initialized volume.
#[derive(Debug)]
pub(crate) struct Mounted {
    pub(crate) header: VolumeHeader,
    pub(crate) store: BackingStore,
    pub(crate) allocator: BlockAllocator,
    pub(crate) namespace: NamespaceTree,
    pub(crate) users: UserTable,
    pub(crate) change_log: ChangeLog,
}

/// Namespace frame and header bytes, encoded and known to fit.
pub(crate) struct StagedMetadata {
    namespace: Vec<u8>,
    header: Vec<u8>,
}

/// One filesystem container on one backing file.
#[derive(Debug, Default)]
pub struct Volume {
    mounted: Option<Mounted>,
}

impl Volume {
    /// An unmounted volume.
    pub fn new() -> Self {
        Self::default()
    }

    /// Format `target` with the given geometry and default users.
    pub fn format(total_size: u64, block_size: u64, target: impl AsRef<Path>) -> FsResult<Self> {
        Self::format_with(&VolumeConfig::with_geometry(total_size, block_size), target)
    }

    /// Format `target`, creating or truncating it.
    ///
    /// Writes a fresh header, the default administrator in slot 0, an empty
    /// namespace and an empty change log. The file is sized so every data
    /// block is addressable.
    pub fn format_with(config: &VolumeConfig, target: impl AsRef<Path>) -> FsResult<Self> {
        let target = target.as_ref();
        config
            .validate()
            .map_err(|e| FsError::invalid_format(e.to_string()))?;

        let header = VolumeHeader::new(config.total_size, config.block_size, config.max_users);
        let mut store = BackingStore::create(target, header.data_end())?;

        let admin = UserRecord::new(
            config.admin_username.clone(),
            &config.admin_password,
            Role::Admin,
        );
        let mut users = UserTable::new(config.max_users as usize);
        users.insert(admin.clone())?;
        let mut table = Vec::with_capacity(config.max_users as usize * USER_SLOT_SIZE as usize);
        table.extend(encode_user_slot(Some(&admin))?);
        for _ in 1..config.max_users {
            table.extend(encode_user_slot(None)?);
        }
        store.write_at(header.user_table_offset, &table)?;

        let change_log = ChangeLog::new(header.change_log_size());
        let mut mounted = Mounted {
            allocator: BlockAllocator::new(header.total_blocks()),
            namespace: NamespaceTree::new(),
            users,
            change_log,
            header,
            store,
        };
        mounted.commit_metadata()?;
        mounted
            .store
            .write_at(mounted.header.change_log_offset, &change_log.cursor_bytes())?;
        mounted.record(ChangeOp::Format, "/", &config.admin_username);
        mounted.store.sync()?;

        info!(
            path = %target.display(),
            volume_id = %mounted.header.volume_id,
            blocks = mounted.header.total_blocks(),
            block_size = mounted.header.block_size,
            "formatted volume"
        );
        Ok(Self {
            mounted: Some(mounted),
        })
    }

    /// Open an existing volume.
    ///
    /// Fails NotFound if `target` is missing, InvalidFormat if the header
    /// does not carry the signature, any region is truncated, or the stored
    /// namespace does not replay cleanly onto a fresh allocator.
    pub fn init(target: impl AsRef<Path>) -> FsResult<Self> {
        let target = target.as_ref();
        let mut store = BackingStore::open(target)?;
        let header = VolumeHeader::decode(&store.read_at(0, HEADER_SIZE as usize)?)?;
        if store.file_len()? < header.data_end() {
            return Err(FsError::invalid_format(format!(
                "{} is shorter than its data region",
                target.display()
            )));
        }

        let table = store.read_at(
            header.user_table_offset,
            header.max_users as usize * USER_SLOT_SIZE as usize,
        )?;
        let slots = table
            .chunks(USER_SLOT_SIZE as usize)
            .map(decode_user_slot)
            .collect::<FsResult<Vec<_>>>()?;
        let users = UserTable::from_slots(header.max_users as usize, slots)?;

        let zone = store.read_at(
            header.file_state_storage_offset,
            header.file_state_storage_size() as usize,
        )?;
        let namespace = NamespaceTree::from_snapshot(decode_framed::<NodeSnapshot>(&zone)?)?;

        let mut allocator = BlockAllocator::new(header.total_blocks());
        for entry in namespace.files() {
            let extent = entry.extent.unwrap_or(Extent::EMPTY);
            if !allocator.is_free(extent) {
                return Err(FsError::invalid_format(format!(
                    "extent of {} ({}+{}) overlaps another file or leaves the volume",
                    entry.name, extent.first_block, extent.block_count
                )));
            }
            allocator.allocate(extent);
        }

        let cursor = store.read_at(header.change_log_offset, CURSOR_SIZE as usize)?;
        let change_log = ChangeLog::from_cursor(header.change_log_size(), &cursor)?;

        info!(
            path = %target.display(),
            volume_id = %header.volume_id,
            users = users.len(),
            files = namespace.files().count(),
            free_blocks = allocator.count_free(),
            "initialized volume"
        );
        Ok(Self {
            mounted: Some(Mounted {
                header,
                store,
                allocator,
                namespace,
                users,
                change_log,
            }),
        })
    }

    /// Flush and close the backing store. Fails InvalidState if the volume
    /// is not initialized, including on a second call.
    pub fn shutdown(&mut self) -> FsResult<()> {
        let mut mounted = self
            .mounted
            .take()
            .ok_or_else(|| FsError::invalid_state("volume is not initialized"))?;
        mounted.store.sync()?;
        info!(path = %mounted.store.path().display(), "volume shut down");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.mounted.is_some()
    }

    pub(crate) fn mounted(&self) -> FsResult<&Mounted> {
        self.mounted
            .as_ref()
            .ok_or_else(|| FsError::invalid_state("volume is not initialized"))
    }

    pub(crate) fn mounted_mut(&mut self) -> FsResult<&mut Mounted> {
        self.mounted
            .as_mut()
            .ok_or_else(|| FsError::invalid_state("volume is not initialized"))
    }

    // ========================================================================
    // Views
    // ========================================================================

    pub fn header(&self) -> FsResult<&VolumeHeader> {
        Ok(&self.mounted()?.header)
    }

    pub fn allocator(&self) -> FsResult<&BlockAllocator> {
        Ok(&self.mounted()?.allocator)
    }

    pub fn namespace(&self) -> FsResult<&NamespaceTree> {
        Ok(&self.mounted()?.namespace)
    }

    pub fn users(&self) -> FsResult<&[UserRecord]> {
        Ok(self.mounted()?.users.records())
    }

    pub fn stats(&self) -> FsResult<VolumeStats> {
        let mounted = self.mounted()?;
        Ok(VolumeStats {
            volume_id: mounted.header.volume_id,
            total_blocks: mounted.allocator.capacity(),
            free_blocks: mounted.allocator.count_free(),
            block_size: mounted.header.block_size,
            files: mounted.namespace.files().count() as u64,
            directories: mounted.namespace.directory_count(),
            users: mounted.users.len() as u64,
            created_at: mounted.header.created_at,
        })
    }

    /// Records held in the change log, oldest first.
    pub fn change_log(&mut self) -> FsResult<Vec<ChangeRecord>> {
        let mounted = self.mounted_mut()?;
        let zone = mounted.store.read_at(
            mounted.header.change_log_offset,
            mounted.header.change_log_size() as usize,
        )?;
        mounted.change_log.records(&zone)
    }

    // ========================================================================
    // Users
    // ========================================================================

    /// Look up an active user.
    pub fn user(&self, username: &str) -> FsResult<&UserRecord> {
        self.mounted()?
            .users
            .lookup(username)
            .ok_or_else(|| FsError::not_found(format!("user {username}")))
    }

    /// Check a password. NotFound for an unknown user, PermissionDenied for
    /// a wrong password.
    pub fn authenticate(&self, username: &str, password: &str) -> FsResult<UserRecord> {
        let user = self.user(username)?;
        if !user.verify_password(password) {
            warn!(username, "authentication failed");
            return Err(FsError::permission_denied(format!("bad credentials for {username}")));
        }
        Ok(user.clone())
    }

    /// Add an active user in the lowest free slot.
    pub fn add_user(&mut self, username: &str, password: &str, role: Role) -> FsResult<()> {
        validate_username(username).map_err(|e| FsError::invalid_path(e.to_string()))?;
        let mounted = self.mounted_mut()?;
        let record = UserRecord::new(username, password, role);
        let slot = mounted.users.insert(record.clone())?;
        if let Err(e) = mounted.write_user_slot(slot, Some(&record)) {
            error!(username, error = %e, "failed to write user slot");
            if let Err(undo) = mounted.users.remove(username) {
                error!(username, error = %undo, "failed to drop unwritten user");
            }
            return Err(e);
        }
        mounted.store.sync()?;
        mounted.record(ChangeOp::AddUser, username, ROOT_OWNER);
        info!(username, %role, slot, "added user");
        Ok(())
    }

    /// Tombstone a user's slot. The last administrator cannot be removed.
    pub fn remove_user(&mut self, username: &str) -> FsResult<()> {
        let mounted = self.mounted_mut()?;
        let user = mounted
            .users
            .lookup(username)
            .ok_or_else(|| FsError::not_found(format!("user {username}")))?;
        if user.is_admin() && mounted.users.admin_count() == 1 {
            warn!(username, "refusing to remove the last administrator");
            return Err(FsError::permission_denied(format!("{username} is the last administrator")));
        }
        // Tombstone the slot before the table forgets the user.
        let mut tombstone = user.clone();
        tombstone.deactivate();
        let slot = mounted
            .users
            .slot_of(username)
            .ok_or_else(|| FsError::not_found(format!("user {username}")))?;
        mounted.write_user_slot(slot, Some(&tombstone))?;
        mounted.users.remove(username)?;
        mounted.store.sync()?;
        mounted.record(ChangeOp::RemoveUser, username, ROOT_OWNER);
        info!(username, slot, "removed user");
        Ok(())
    }
}

impl Mounted {
    pub(crate) fn write_user_slot(
        &mut self,
        slot: usize,
        record: Option<&UserRecord>,
    ) -> FsResult<()> {
        let offset = self.header.user_slot_offset(slot);
        self.store.write_at(offset, &encode_user_slot(record)?)
    }

    /// Encode the namespace and header without writing anything.
    /// OutOfSpace if the tree outgrew its zone.
    pub(crate) fn stage_metadata(&self) -> FsResult<StagedMetadata> {
        Ok(StagedMetadata {
            namespace: encode_framed(
                &self.namespace.snapshot(),
                self.header.file_state_storage_size(),
            )?,
            header: self.header.encode()?,
        })
    }

    pub(crate) fn write_metadata(&mut self, staged: &StagedMetadata) -> FsResult<()> {
        self.store
            .write_at(self.header.file_state_storage_offset, &staged.namespace)?;
        self.store.write_at(0, &staged.header)
    }

    /// Persist the namespace and header after a mutation.
    pub(crate) fn commit_metadata(&mut self) -> FsResult<()> {
        let staged = self.stage_metadata()?;
        self.write_metadata(&staged)
    }

    /// Best-effort rewrite after an in-memory rollback.
    pub(crate) fn restore_metadata(&mut self) {
        if let Err(e) = self.commit_metadata() {
            error!(error = %e, "failed to rewrite metadata after rollback");
        }
    }

    /// Append to the change log. Failures are logged, not returned: the
    /// mutation being recorded has already been applied.
    pub(crate) fn record(&mut self, op: ChangeOp, path: &str, actor: &str) {
        if let Err(e) = self.try_record(op, path, actor) {
            error!(%op, path, error = %e, "failed to append change record");
        }
    }

    fn try_record(&mut self, op: ChangeOp, path: &str, actor: &str) -> FsResult<()> {
        let mut log = self.change_log;
        let pending = log.append(op, path, actor)?;
        if pending.wrapped {
            warn!(seq = log.next_seq() - 1, "change log wrapped, older records discarded");
        }
        let base = self.header.change_log_offset;
        self.store.write_at(base + pending.offset, &pending.frame)?;
        self.store.write_at(base, &log.cursor_bytes())?;
        self.change_log = log;
        Ok(())
    }

    /// Write `data` at the start of `extent`.
    pub(crate) fn write_extent(&mut self, extent: Extent, data: &[u8]) -> FsResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let offset = self.header.block_offset(extent.first_block);
        self.store.write_at(offset, data)
    }

    /// Read `len` bytes from the start of `extent`.
    pub(crate) fn read_extent(&mut self, extent: Extent, len: u64) -> FsResult<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let offset = self.header.block_offset(extent.first_block);
        self.store.read_at(offset, len as usize)
    }
}
