//! Change log: an audit trail of applied mutations.
//!
//! The zone starts with a 16-byte cursor (`u64` LE write offset relative to
//! the zone start, `u64` LE next sequence number) followed by
//! `[u32 LE length][postcard ChangeRecord]` frames. Frames live in
//! `[CURSOR_SIZE, write_offset)`. When a frame does not fit before the end of
//! the zone the log wraps: writing restarts right after the cursor and every
//! older frame is discarded.
//!
//! This is not a recovery journal. Records are appended after the mutation
//! they describe has already been applied.

use serde::{Deserialize, Serialize};

use omnifs_types::unix_now;

use super::error::{FsError, FsResult};
use super::layout::{decode_framed, encode_framed, frame_len};

/// Bytes of cursor at the start of the zone.
pub const CURSOR_SIZE: u64 = 16;

/// Mutation kinds recorded in the log.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeOp {
    Format,
    CreateFile,
    EditFile,
    DeleteFile,
    CreateDirectory,
    DeleteDirectory,
    AddUser,
    RemoveUser,
}

/// One log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub seq: u64,
    /// Unix seconds.
    pub timestamp: u64,
    pub op: ChangeOp,
    /// Path for file operations, username for user operations.
    pub path: String,
    /// Acting username.
    pub actor: String,
}

/// Bytes to write for one append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAppend {
    /// Frame offset relative to the zone start.
    pub offset: u64,
    pub frame: Vec<u8>,
    /// Whether this append discarded older records.
    pub wrapped: bool,
}

/// Cursor state of a change-log zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeLog {
    zone_size: u64,
    write_offset: u64,
    next_seq: u64,
}

impl ChangeLog {
    /// An empty log over a zone of `zone_size` bytes.
    pub fn new(zone_size: u64) -> Self {
        Self {
            zone_size,
            write_offset: CURSOR_SIZE,
            next_seq: 1,
        }
    }

    /// Restore the cursor from the first `CURSOR_SIZE` bytes of a zone.
    pub fn from_cursor(zone_size: u64, cursor: &[u8]) -> FsResult<Self> {
        let field = |range: std::ops::Range<usize>| -> FsResult<u64> {
            cursor
                .get(range)
                .and_then(|b| b.try_into().ok())
                .map(u64::from_le_bytes)
                .ok_or_else(|| FsError::invalid_format("truncated change log cursor"))
        };
        let write_offset = field(0..8)?;
        let next_seq = field(8..16)?;
        if !(CURSOR_SIZE..=zone_size).contains(&write_offset) {
            return Err(FsError::invalid_format(format!(
                "change log write offset {write_offset} outside zone"
            )));
        }
        Ok(Self {
            zone_size,
            write_offset,
            next_seq,
        })
    }

    pub fn cursor_bytes(&self) -> [u8; CURSOR_SIZE as usize] {
        let mut buf = [0u8; CURSOR_SIZE as usize];
        buf[..8].copy_from_slice(&self.write_offset.to_le_bytes());
        buf[8..].copy_from_slice(&self.next_seq.to_le_bytes());
        buf
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Stage a record and advance the cursor. The caller writes the frame
    /// and then the cursor.
    pub fn append(
        &mut self,
        op: ChangeOp,
        path: impl Into<String>,
        actor: impl Into<String>,
    ) -> FsResult<PendingAppend> {
        let record = ChangeRecord {
            seq: self.next_seq,
            timestamp: unix_now(),
            op,
            path: path.into(),
            actor: actor.into(),
        };
        let frame = encode_framed(&record, self.zone_size - CURSOR_SIZE)?;
        let len = frame.len() as u64;
        let wrapped = self.write_offset + len > self.zone_size;
        if wrapped {
            self.write_offset = CURSOR_SIZE;
        }
        let offset = self.write_offset;
        self.write_offset += len;
        self.next_seq += 1;
        Ok(PendingAppend {
            offset,
            frame,
            wrapped,
        })
    }

    /// Decode every held record from a full copy of the zone.
    pub fn records(&self, zone: &[u8]) -> FsResult<Vec<ChangeRecord>> {
        let end = self.write_offset as usize;
        if zone.len() < end {
            return Err(FsError::invalid_format("change log zone truncated"));
        }
        let mut records = Vec::new();
        let mut at = CURSOR_SIZE as usize;
        while at < end {
            let frame = &zone[at..end];
            let len = frame_len(frame)?;
            records.push(decode_framed(frame)?);
            at += 4 + len;
        }
        Ok(records)
    }
}
