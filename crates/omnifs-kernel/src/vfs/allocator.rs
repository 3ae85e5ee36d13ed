//! Block allocator: one bit per block, first-fit.
//!
//! The allocator knows nothing about files. Which blocks a file holds is
//! recorded in its entry's extent, so the bitmap is never persisted; a volume
//! rebuilds it on init by replaying the live extents.

use super::types::Extent;

/// Bitmap over the fixed-size blocks of a volume. Bit set = allocated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockAllocator {
    bits: Vec<u8>,
    nbits: u64,
}

impl BlockAllocator {
    /// An allocator for `capacity` blocks, all free.
    pub fn new(capacity: u64) -> Self {
        Self {
            bits: vec![0; capacity.div_ceil(8) as usize],
            nbits: capacity,
        }
    }

    /// Total number of blocks.
    pub fn capacity(&self) -> u64 {
        self.nbits
    }

    /// Mark or clear one block. Out-of-range indices are ignored.
    pub fn set_allocated(&mut self, index: u64, allocated: bool) {
        if index >= self.nbits {
            return;
        }
        let byte = &mut self.bits[(index / 8) as usize];
        let mask = 1u8 << (index % 8);
        if allocated {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
    }

    /// Whether a block is allocated. Out-of-range indices read as free.
    pub fn is_allocated(&self, index: u64) -> bool {
        if index >= self.nbits {
            return false;
        }
        self.bits[(index / 8) as usize] & (1u8 << (index % 8)) != 0
    }

    /// Lowest index starting `count` consecutive free blocks.
    ///
    /// `count <= 1` asks for the lowest single free block.
    pub fn find_free_run(&self, count: u64) -> Option<u64> {
        let count = count.max(1);
        let mut run = 0u64;
        for index in 0..self.nbits {
            if self.is_allocated(index) {
                run = 0;
                continue;
            }
            run += 1;
            if run == count {
                return Some(index + 1 - count);
            }
        }
        None
    }

    /// Number of free blocks.
    pub fn count_free(&self) -> u64 {
        let used: u64 = self.bits.iter().map(|b| b.count_ones() as u64).sum();
        self.nbits - used
    }

    /// Mark every block of `extent`.
    pub fn allocate(&mut self, extent: Extent) {
        for index in extent.blocks() {
            self.set_allocated(index, true);
        }
    }

    /// Clear every block of `extent`.
    pub fn release(&mut self, extent: Extent) {
        for index in extent.blocks() {
            self.set_allocated(index, false);
        }
    }

    /// Whether every block of `extent` is in range and free.
    pub fn is_free(&self, extent: Extent) -> bool {
        extent.first_block + extent.block_count <= self.nbits
            && extent.blocks().all(|index| !self.is_allocated(index))
    }
}
