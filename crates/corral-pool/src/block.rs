//! Fixed-size memory blocks and the block chain.
//!
//! A [`Block`] is one system allocation with a bump cursor. A [`BlockChain`]
//! is the pool's ordered list of blocks: small requests walk it from the
//! `current` block onwards and a new block is appended when none fits.

use std::fmt;

use corral_core::{align_up, BlockId, PoolError, SystemAllocator};

use crate::config::PoolConfig;

/// A single contiguous block with bump allocation.
///
/// All offsets are relative to the block's aligned base, so an offset
/// aligned to `n <= POOL_ALIGNMENT` is also an `n`-aligned address.
/// Blocks are never freed while the pool lives, only rewound by reset.
pub struct Block {
    /// Backing storage, over-allocated so that `base` can be aligned.
    storage: Vec<u8>,
    /// Index of the aligned base within `storage`.
    base: usize,
    /// First usable offset, just past the header.
    start: usize,
    /// Bump pointer: next free offset.
    cursor: usize,
    /// One past the last usable offset.
    end: usize,
    /// Number of times a chain walk passed over this block without success.
    failed: u32,
}

impl Block {
    /// Carve a block of `size` bytes out of `storage`, reserving `header`
    /// bytes at its start.
    ///
    /// `storage` must hold at least `size + POOL_ALIGNMENT - 1` bytes.
    pub(crate) fn new(storage: Vec<u8>, size: usize, header: usize) -> Self {
        let base = storage
            .as_ptr()
            .align_offset(PoolConfig::POOL_ALIGNMENT)
            .min(storage.len().saturating_sub(size));
        Self {
            storage,
            base,
            start: header,
            cursor: header,
            end: size,
            failed: 0,
        }
    }

    /// Allocate a block of `size` bytes from the system allocator.
    pub(crate) fn allocate(
        system: &dyn SystemAllocator,
        size: usize,
        header: usize,
    ) -> Result<Self, PoolError> {
        let padded = size
            .checked_add(PoolConfig::POOL_ALIGNMENT - 1)
            .ok_or(PoolError::OutOfMemory { requested: size })?;
        let storage = system.allocate(padded)?;
        Ok(Self::new(storage, size, header))
    }

    /// Bump-allocate `size` bytes, optionally aligning the cursor first.
    ///
    /// Returns the offset of the allocation, or `None` if the remaining
    /// space cannot cover it. A failed attempt leaves the cursor untouched.
    pub fn bump(&mut self, size: usize, align: Option<usize>) -> Option<usize> {
        let offset = match align {
            Some(alignment) => align_up(self.cursor, alignment)?,
            None => self.cursor,
        };
        let remaining = self.end.checked_sub(offset)?;
        if remaining < size {
            return None;
        }
        self.cursor = offset + size;
        Some(offset)
    }

    /// Extend the allocation ending at `offset + len` by `extra` bytes.
    ///
    /// Succeeds only if that allocation is the most recent one in this
    /// block and the block still has room.
    pub(crate) fn try_extend(&mut self, offset: usize, len: usize, extra: usize) -> bool {
        if offset.checked_add(len) != Some(self.cursor) || self.end - self.cursor < extra {
            return false;
        }
        self.cursor += extra;
        true
    }

    /// Undo the allocation at `offset` if it is the most recent one.
    pub(crate) fn give_back(&mut self, offset: usize, len: usize) -> bool {
        if offset.checked_add(len) != Some(self.cursor) || offset < self.start {
            return false;
        }
        self.cursor = offset;
        true
    }

    /// Move the cursor back to `cursor`, undoing everything allocated since.
    ///
    /// Ignored unless `cursor` lies between the header and the current cursor.
    pub(crate) fn rewind_to(&mut self, cursor: usize) {
        if (self.start..=self.cursor).contains(&cursor) {
            self.cursor = cursor;
        }
    }

    /// Rewind the cursor to just past the header and clear the failure count.
    pub fn rewind(&mut self) {
        self.cursor = self.start;
        self.failed = 0;
    }

    #[cfg(test)]
    fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        let start = self.base + offset;
        &self.storage[start..start + len]
    }

    /// Index in `storage` of the byte at `offset`.
    pub(crate) fn storage_index(&self, offset: usize) -> usize {
        self.base + offset
    }

    pub(crate) fn storage(&self) -> &[u8] {
        &self.storage
    }

    pub(crate) fn storage_mut(&mut self) -> &mut [u8] {
        &mut self.storage
    }

    /// Whether `[offset, offset + len)` lies in the usable part of the block.
    pub(crate) fn contains(&self, offset: usize, len: usize) -> bool {
        offset >= self.start && offset.checked_add(len).is_some_and(|end| end <= self.end)
    }

    /// Current bump offset.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of bytes handed out since the last rewind.
    pub fn used(&self) -> usize {
        self.cursor - self.start
    }

    /// Bytes still available for bump allocation.
    pub fn remaining(&self) -> usize {
        self.end - self.cursor
    }

    /// Usable bytes, excluding the header.
    pub fn capacity(&self) -> usize {
        self.end - self.start
    }

    /// Consecutive failed allocation attempts charged to this block.
    pub fn failed(&self) -> u32 {
        self.failed
    }

    /// Memory usage of the backing storage in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.storage.len()
    }

    /// Snapshot of this block's counters.
    pub fn stats(&self) -> BlockStats {
        BlockStats {
            used: self.used(),
            remaining: self.remaining(),
            capacity: self.capacity(),
            failed: self.failed,
        }
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("start", &self.start)
            .field("cursor", &self.cursor)
            .field("end", &self.end)
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

/// Point-in-time counters for one block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockStats {
    /// Bytes handed out since the last rewind.
    pub used: usize,
    /// Bytes still available.
    pub remaining: usize,
    /// Usable bytes, excluding the header.
    pub capacity: usize,
    /// Failure counter.
    pub failed: u32,
}

/// Where a block's cursor stood before one allocation.
///
/// Returned by [`BlockChain::alloc_marked`] and consumed by
/// [`BlockChain::rewind_to`] to roll that allocation back exactly,
/// alignment padding included.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mark {
    block: BlockId,
    cursor: usize,
}

impl Mark {
    /// The block the allocation was served from.
    pub fn block(&self) -> BlockId {
        self.block
    }
}

/// The ordered chain of blocks owned by a pool.
///
/// Small allocations start at `current` and walk towards the tail. When no
/// block has room, a new block of the same size is appended. Every block
/// between `current` and the old tail is charged one failure; a block whose
/// count was already above [`PoolConfig::FAIL_SKIP_THRESHOLD`] is skipped by
/// moving `current` past it.
#[derive(Debug)]
pub struct BlockChain {
    blocks: Vec<Block>,
    block_size: usize,
    /// Index of the first block tried by small allocations.
    current: usize,
}

impl BlockChain {
    /// Create a chain holding one block of `block_size` bytes whose header
    /// region is the full pool header.
    pub fn new(system: &dyn SystemAllocator, block_size: usize) -> Result<Self, PoolError> {
        let first = Block::allocate(system, block_size, PoolConfig::POOL_HEADER_SIZE)?;
        Ok(Self {
            blocks: vec![first],
            block_size,
            current: 0,
        })
    }

    /// Bump-allocate `size` bytes, appending a block if needed.
    ///
    /// `size` must not exceed the pool's small-allocation threshold, which
    /// guarantees a fresh block can hold it.
    pub fn alloc(
        &mut self,
        system: &dyn SystemAllocator,
        size: usize,
        aligned: bool,
    ) -> Result<(BlockId, usize), PoolError> {
        let (offset, mark) = self.alloc_marked(system, size, aligned)?;
        Ok((mark.block, offset))
    }

    /// Like [`alloc`](Self::alloc), also returning the cursor the serving
    /// block had before the allocation.
    pub fn alloc_marked(
        &mut self,
        system: &dyn SystemAllocator,
        size: usize,
        aligned: bool,
    ) -> Result<(usize, Mark), PoolError> {
        let align = aligned.then_some(PoolConfig::ALIGNMENT);
        for index in self.current..self.blocks.len() {
            let block = &mut self.blocks[index];
            let cursor = block.cursor;
            if let Some(offset) = block.bump(size, align) {
                let mark = Mark {
                    block: BlockId(index as u32),
                    cursor,
                };
                return Ok((offset, mark));
            }
        }
        self.grow(system, size)
    }

    /// Undo the allocation `mark` was taken for, and any made after it in
    /// the same block.
    pub fn rewind_to(&mut self, mark: Mark) {
        if let Some(block) = self.blocks.get_mut(mark.block.index()) {
            block.rewind_to(mark.cursor);
        }
    }

    /// Append a new block and serve `size` bytes from it.
    fn grow(
        &mut self,
        system: &dyn SystemAllocator,
        size: usize,
    ) -> Result<(usize, Mark), PoolError> {
        let mut block = Block::allocate(system, self.block_size, PoolConfig::BLOCK_HEADER_SIZE)?;
        let cursor = block.cursor;
        // The first allocation in a fresh block is always word-aligned.
        let offset = block
            .bump(size, Some(PoolConfig::ALIGNMENT))
            .ok_or(PoolError::OutOfMemory { requested: size })?;

        let tail = self.blocks.len() - 1;
        for index in self.current..tail {
            let block = &mut self.blocks[index];
            let failed = block.failed;
            block.failed += 1;
            if failed > PoolConfig::FAIL_SKIP_THRESHOLD {
                self.current = index + 1;
            }
        }

        self.blocks.push(block);
        let mark = Mark {
            block: BlockId(tail as u32 + 1),
            cursor,
        };
        Ok((offset, mark))
    }

    /// Rewind every block and point `current` back at the first block.
    pub fn reset(&mut self) {
        for block in &mut self.blocks {
            block.rewind();
        }
        self.current = 0;
    }

    /// Look up a block by id.
    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.index())
    }

    pub(crate) fn get_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.blocks.get_mut(id.index())
    }

    pub(crate) fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub(crate) fn blocks_mut(&mut self) -> &mut [Block] {
        &mut self.blocks
    }

    /// Iterate over blocks in chain order.
    pub fn iter(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (BlockId(i as u32), b))
    }

    /// The block small allocations start from.
    pub fn current(&self) -> BlockId {
        BlockId(self.current as u32)
    }

    /// Total number of blocks in the chain.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the chain holds no blocks.
    ///
    /// A chain made by [`new`](Self::new) always holds its first block.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Total memory usage across all blocks in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.blocks.iter().map(Block::memory_bytes).sum()
    }

    /// Total bytes handed out across all blocks.
    pub fn total_used(&self) -> usize {
        self.blocks.iter().map(Block::used).sum()
    }
}
