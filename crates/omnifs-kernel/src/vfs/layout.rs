//! On-disk volume layout.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ [0 .. header_size)          VolumeHeader, magic "OMNIFS01"   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ [user_table_offset ..)      max_users fixed-size user slots  │
//! ├──────────────────────────────────────────────────────────────┤
//! │ [file_state_storage_offset) 64 KiB, namespace tree snapshot  │
//! ├──────────────────────────────────────────────────────────────┤
//! │ [change_log_offset ..)      128 KiB, change log              │
//! ├──────────────────────────────────────────────────────────────┤
//! │ [data_blocks_offset .. end) block_size data blocks           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Fixed-size records (header, user slots) are postcard-encoded into a
//! zeroed slot. Variable-size records (the namespace snapshot) are framed as
//! `[u32 LE length][postcard payload]` inside their zone. A zeroed user slot
//! decodes as `None`, so a freshly formatted table needs no special marker.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use omnifs_types::{FIRST_DIR_INODE, FIRST_FILE_INODE, Inode, UserRecord, unix_now};

use super::error::{FsError, FsResult};

/// Volume signature, first eight bytes of every volume.
pub const MAGIC: [u8; 8] = *b"OMNIFS01";

/// Format version: major in the high 16 bits, minor in the low 16.
pub const FORMAT_VERSION: u32 = 0x0001_0000;

/// Bytes reserved for the header.
pub const HEADER_SIZE: u64 = 512;

/// Bytes per user slot.
pub const USER_SLOT_SIZE: u64 = 256;

/// Namespace persistence zone.
pub const FILE_STATE_STORAGE_SIZE: u64 = 64 * 1024;

/// Change log zone.
pub const CHANGE_LOG_SIZE: u64 = 128 * 1024;

/// Length prefix of a framed record.
const FRAME_PREFIX: usize = 4;

/// Fixed-size record at offset 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeHeader {
    pub magic: [u8; 8],
    pub format_version: u32,
    pub total_size: u64,
    pub block_size: u64,
    pub header_size: u64,
    pub max_users: u32,
    pub user_table_offset: u64,
    pub file_state_storage_offset: u64,
    pub change_log_offset: u64,
    pub data_blocks_offset: u64,
    /// Next inode for a file; never reused.
    pub next_file_inode: Inode,
    /// Next inode for a directory; never reused.
    pub next_dir_inode: Inode,
    pub volume_id: Uuid,
    /// Unix seconds.
    pub created_at: u64,
}

impl VolumeHeader {
    /// Header for a fresh volume. Offsets pack the zones back to back.
    pub fn new(total_size: u64, block_size: u64, max_users: u32) -> Self {
        let user_table_offset = HEADER_SIZE;
        let file_state_storage_offset = user_table_offset + max_users as u64 * USER_SLOT_SIZE;
        let change_log_offset = file_state_storage_offset + FILE_STATE_STORAGE_SIZE;
        let data_blocks_offset = change_log_offset + CHANGE_LOG_SIZE;
        Self {
            magic: MAGIC,
            format_version: FORMAT_VERSION,
            total_size,
            block_size,
            header_size: HEADER_SIZE,
            max_users,
            user_table_offset,
            file_state_storage_offset,
            change_log_offset,
            data_blocks_offset,
            next_file_inode: Inode::new(FIRST_FILE_INODE),
            next_dir_inode: Inode::new(FIRST_DIR_INODE),
            volume_id: Uuid::new_v4(),
            created_at: unix_now(),
        }
    }

    /// Number of data blocks the allocator tracks.
    pub fn total_blocks(&self) -> u64 {
        self.total_size / self.block_size
    }

    /// Byte offset of data block `block`.
    pub fn block_offset(&self, block: u64) -> u64 {
        self.data_blocks_offset + block * self.block_size
    }

    /// One past the last byte of the last data block.
    pub fn data_end(&self) -> u64 {
        self.block_offset(self.total_blocks())
    }

    pub fn user_slot_offset(&self, slot: usize) -> u64 {
        self.user_table_offset + slot as u64 * USER_SLOT_SIZE
    }

    pub fn file_state_storage_size(&self) -> u64 {
        self.change_log_offset - self.file_state_storage_offset
    }

    pub fn change_log_size(&self) -> u64 {
        self.data_blocks_offset - self.change_log_offset
    }

    /// Blocks needed to hold `len` bytes.
    pub fn blocks_for(&self, len: u64) -> u64 {
        len.div_ceil(self.block_size)
    }

    /// Hand out the next file inode.
    ///
    /// Files count up below [`FIRST_DIR_INODE`]. Once they reach it, files
    /// and directories draw from one shared counter so the two kinds never
    /// hand out the same number.
    pub fn take_file_inode(&mut self) -> Inode {
        if self.file_range_exhausted() {
            return self.take_shared_inode();
        }
        let inode = self.next_file_inode;
        self.next_file_inode = inode.next();
        inode
    }

    /// Hand out the next directory inode.
    pub fn take_dir_inode(&mut self) -> Inode {
        if self.file_range_exhausted() {
            return self.take_shared_inode();
        }
        let inode = self.next_dir_inode;
        self.next_dir_inode = inode.next();
        inode
    }

    fn file_range_exhausted(&self) -> bool {
        self.next_file_inode.get() >= FIRST_DIR_INODE
    }

    fn take_shared_inode(&mut self) -> Inode {
        let inode = self.next_file_inode.max(self.next_dir_inode);
        self.next_file_inode = inode.next();
        self.next_dir_inode = inode.next();
        inode
    }

    /// Check signature, version and layout invariants.
    pub fn validate(&self) -> FsResult<()> {
        if self.magic != MAGIC {
            return Err(FsError::invalid_format("signature mismatch"));
        }
        if self.format_version >> 16 != FORMAT_VERSION >> 16 {
            return Err(FsError::invalid_format(format!(
                "unsupported format version {:#x}",
                self.format_version
            )));
        }
        if self.block_size == 0 || self.total_size == 0 || self.total_size % self.block_size != 0
        {
            return Err(FsError::invalid_format(format!(
                "total size {} is not a multiple of block size {}",
                self.total_size, self.block_size
            )));
        }
        let user_table_end = self.user_table_offset + self.max_users as u64 * USER_SLOT_SIZE;
        let ordered = self.user_table_offset >= self.header_size
            && self.file_state_storage_offset > self.user_table_offset
            && self.file_state_storage_offset >= user_table_end
            && self.change_log_offset > self.file_state_storage_offset
            && self.data_blocks_offset > self.change_log_offset;
        if !ordered {
            return Err(FsError::invalid_format("zone offsets out of order"));
        }
        Ok(())
    }

    /// Encode into a zero-padded `HEADER_SIZE` buffer.
    pub fn encode(&self) -> FsResult<Vec<u8>> {
        encode_slot(self, HEADER_SIZE as usize)
    }

    /// Decode and validate a header buffer.
    pub fn decode(bytes: &[u8]) -> FsResult<Self> {
        if bytes.len() < MAGIC.len() || bytes[..MAGIC.len()] != MAGIC {
            return Err(FsError::invalid_format("signature mismatch"));
        }
        let header: VolumeHeader = postcard::from_bytes(bytes)
            .map_err(|e| FsError::invalid_format(format!("unreadable header: {e}")))?;
        header.validate()?;
        Ok(header)
    }
}

/// Encode `value` into a zeroed buffer of exactly `size` bytes.
pub fn encode_slot<T: Serialize>(value: &T, size: usize) -> FsResult<Vec<u8>> {
    let mut buf = vec![0u8; size];
    postcard::to_slice(value, &mut buf).map_err(|e| match e {
        postcard::Error::SerializeBufferFull => {
            FsError::out_of_space(format!("record does not fit a {size}-byte slot"))
        }
        other => FsError::Codec(other),
    })?;
    Ok(buf)
}

/// Encode one user slot; `None` is an empty slot.
pub fn encode_user_slot(record: Option<&UserRecord>) -> FsResult<Vec<u8>> {
    encode_slot(&record, USER_SLOT_SIZE as usize)
}

/// Decode one user slot.
pub fn decode_user_slot(bytes: &[u8]) -> FsResult<Option<UserRecord>> {
    Ok(postcard::from_bytes(bytes)?)
}

/// Frame `value` as `[u32 LE length][payload]`, failing if the frame would
/// exceed `capacity`.
pub fn encode_framed<T: Serialize>(value: &T, capacity: u64) -> FsResult<Vec<u8>> {
    let payload = postcard::to_stdvec(value)?;
    let framed_len = (FRAME_PREFIX + payload.len()) as u64;
    if framed_len > capacity {
        return Err(FsError::out_of_space(format!(
            "{framed_len}-byte record exceeds {capacity}-byte zone"
        )));
    }
    let mut buf = Vec::with_capacity(framed_len as usize);
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Read the length prefix of a frame.
pub fn frame_len(prefix: &[u8]) -> FsResult<usize> {
    let bytes: [u8; FRAME_PREFIX] = prefix
        .get(..FRAME_PREFIX)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| FsError::invalid_format("truncated frame prefix"))?;
    Ok(u32::from_le_bytes(bytes) as usize)
}

/// Decode a frame produced by [`encode_framed`] from the start of `zone`.
pub fn decode_framed<T: DeserializeOwned>(zone: &[u8]) -> FsResult<T> {
    let len = frame_len(zone)?;
    let payload = zone
        .get(FRAME_PREFIX..FRAME_PREFIX + len)
        .ok_or_else(|| FsError::invalid_format("frame overruns its zone"))?;
    Ok(postcard::from_bytes(payload)?)
}
