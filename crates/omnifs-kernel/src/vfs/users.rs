//! User directory.
//!
//! [`UserTable`] holds the live user records and the on-disk slot each one
//! occupies. [`UserIndex`] is an accelerator over it: an open-addressing
//! hash table mapping username to record index, rebuilt whenever the record
//! sequence changes shape. The record sequence is authoritative.

use omnifs_types::UserRecord;

use super::error::{FsError, FsResult};

/// Default number of index buckets.
pub const DEFAULT_INDEX_CAPACITY: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Bucket {
    Empty,
    Occupied { key: String, value: usize },
    /// Removed key; probing continues past it.
    Deleted,
}

/// Open-addressing username → record-index map with linear probing.
#[derive(Debug, Clone)]
pub struct UserIndex {
    buckets: Vec<Bucket>,
}

impl Default for UserIndex {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_INDEX_CAPACITY)
    }
}

impl UserIndex {
    /// An empty index with a fixed number of buckets (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buckets: vec![Bucket::Empty; capacity.max(1)],
        }
    }

    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Polynomial rolling hash (base 33, seed 5381) over the key bytes.
    fn home(&self, key: &str) -> usize {
        let hash = key
            .bytes()
            .fold(5381u64, |h, b| h.wrapping_mul(33).wrapping_add(b as u64));
        (hash % self.buckets.len() as u64) as usize
    }

    /// Probe sequence starting at the key's home bucket, visiting every
    /// bucket once.
    fn probe(&self, key: &str) -> impl Iterator<Item = usize> + use<> {
        let len = self.buckets.len();
        let start = self.home(key);
        (0..len).map(move |step| (start + step) % len)
    }

    /// Insert or overwrite `key`.
    ///
    /// Fails with OutOfSpace only when every bucket holds a different key.
    pub fn insert(&mut self, key: &str, value: usize) -> FsResult<()> {
        let mut reusable = None;
        for idx in self.probe(key) {
            match &mut self.buckets[idx] {
                Bucket::Occupied { key: k, value: v } if k.as_str() == key => {
                    *v = value;
                    return Ok(());
                }
                Bucket::Occupied { .. } => {}
                Bucket::Deleted => {
                    reusable.get_or_insert(idx);
                }
                Bucket::Empty => {
                    reusable.get_or_insert(idx);
                    break;
                }
            }
        }
        let idx = reusable.ok_or_else(|| FsError::out_of_space("user index is full"))?;
        self.buckets[idx] = Bucket::Occupied {
            key: key.to_string(),
            value,
        };
        Ok(())
    }

    /// Record index for `key`.
    pub fn lookup(&self, key: &str) -> Option<usize> {
        for idx in self.probe(key) {
            match &self.buckets[idx] {
                Bucket::Occupied { key: k, value } if k == key => return Some(*value),
                Bucket::Empty => return None,
                _ => {}
            }
        }
        None
    }

    /// Remove `key`; returns whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        for idx in self.probe(key) {
            match &self.buckets[idx] {
                Bucket::Occupied { key: k, .. } if k == key => {
                    self.buckets[idx] = Bucket::Deleted;
                    return true;
                }
                Bucket::Empty => return false,
                _ => {}
            }
        }
        false
    }

    pub fn clear(&mut self) {
        self.buckets.fill(Bucket::Empty);
    }
}

/// Live user records, their disk slots, and the index over them.
#[derive(Debug, Clone)]
pub struct UserTable {
    records: Vec<UserRecord>,
    /// Disk slot of `records[i]`.
    slots: Vec<usize>,
    index: UserIndex,
    max_users: usize,
}

impl UserTable {
    /// An empty table with `max_users` slots.
    pub fn new(max_users: usize) -> Self {
        Self {
            records: Vec::new(),
            slots: Vec::new(),
            index: UserIndex::with_capacity(DEFAULT_INDEX_CAPACITY.max(max_users * 2)),
            max_users,
        }
    }

    /// Build a table from decoded disk slots, keeping active records only.
    pub fn from_slots(
        max_users: usize,
        slots: impl IntoIterator<Item = Option<UserRecord>>,
    ) -> FsResult<Self> {
        let mut table = Self::new(max_users);
        for (slot, record) in slots.into_iter().enumerate().take(max_users) {
            let Some(record) = record.filter(|r| r.active) else {
                continue;
            };
            if table.index.lookup(&record.username).is_some() {
                return Err(FsError::invalid_format(format!(
                    "duplicate user in table: {}",
                    record.username
                )));
            }
            table.index.insert(&record.username, table.records.len())?;
            table.records.push(record);
            table.slots.push(slot);
        }
        Ok(table)
    }

    fn rebuild_index(&mut self) -> FsResult<()> {
        self.index.clear();
        for (i, record) in self.records.iter().enumerate() {
            self.index.insert(&record.username, i)?;
        }
        Ok(())
    }

    pub fn max_users(&self) -> usize {
        self.max_users
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[UserRecord] {
        &self.records
    }

    pub fn lookup(&self, username: &str) -> Option<&UserRecord> {
        self.index.lookup(username).map(|i| &self.records[i])
    }

    /// Number of active administrators.
    pub fn admin_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_admin()).count()
    }

    /// Add an active record in the lowest free slot. Returns the slot.
    pub fn insert(&mut self, record: UserRecord) -> FsResult<usize> {
        if self.lookup(&record.username).is_some() {
            return Err(FsError::already_exists(format!("user {}", record.username)));
        }
        let slot = (0..self.max_users)
            .find(|s| !self.slots.contains(s))
            .ok_or_else(|| {
                FsError::out_of_space(format!("all {} user slots are in use", self.max_users))
            })?;
        self.index.insert(&record.username, self.records.len())?;
        self.records.push(record);
        self.slots.push(slot);
        Ok(slot)
    }

    /// Slot holding an active user.
    pub fn slot_of(&self, username: &str) -> Option<usize> {
        self.index.lookup(username).and_then(|i| self.slots.get(i).copied())
    }

    /// Remove a record. Returns the freed slot and the removed record.
    pub fn remove(&mut self, username: &str) -> FsResult<(usize, UserRecord)> {
        let i = self
            .index
            .lookup(username)
            .ok_or_else(|| FsError::not_found(format!("user {username}")))?;
        let record = self.records.swap_remove(i);
        let slot = self.slots.swap_remove(i);
        self.rebuild_index()?;
        Ok((slot, record))
    }
}
