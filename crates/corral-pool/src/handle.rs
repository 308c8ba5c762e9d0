//! Region handles and location descriptors.
//!
//! A [`Region`] stands in for a raw address. It encodes where the bytes
//! live (a block offset or a large-allocation record), the pool that
//! minted it and the pool generation it was minted in, so both staleness
//! after a reset and mix-ups between pools are O(1) checks rather than
//! use-after-free.

use std::fmt;

use corral_core::{BlockId, PoolId, SlotId};

/// Location and length of an allocation within a pool.
///
/// Regions are plain `Copy` tokens; they borrow nothing. Resolve them to
/// bytes with [`Pool::bytes`](crate::Pool::bytes) and
/// [`Pool::bytes_mut`](crate::Pool::bytes_mut).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[must_use]
pub struct Region {
    /// The pool that minted this region.
    pub(crate) pool: PoolId,
    /// Pool generation when this region was minted.
    pub(crate) generation: u32,
    /// Length of the region in bytes.
    pub(crate) len: usize,
    /// Which block or large record this region points into.
    pub(crate) location: RegionLocation,
}

impl Region {
    pub(crate) fn block(
        pool: PoolId,
        generation: u32,
        block: BlockId,
        offset: usize,
        len: usize,
    ) -> Self {
        Self {
            pool,
            generation,
            len,
            location: RegionLocation::Block { block, offset },
        }
    }

    pub(crate) fn large(
        pool: PoolId,
        generation: u32,
        slot: SlotId,
        serial: u64,
        len: usize,
    ) -> Self {
        Self {
            pool,
            generation,
            len,
            location: RegionLocation::Large {
                slot,
                serial,
                offset: 0,
            },
        }
    }

    /// The pool this region belongs to.
    pub fn pool(&self) -> PoolId {
        self.pool
    }

    /// The pool generation this region belongs to.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Length of the region in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether this is a zero-length region.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The location descriptor.
    pub fn location(&self) -> RegionLocation {
        self.location
    }

    /// Whether the region is backed by its own system allocation.
    pub fn is_large(&self) -> bool {
        matches!(self.location, RegionLocation::Large { .. })
    }

    /// The block holding this region, if it was bump-allocated.
    pub fn block_id(&self) -> Option<BlockId> {
        match self.location {
            RegionLocation::Block { block, .. } => Some(block),
            RegionLocation::Large { .. } => None,
        }
    }

    /// A sub-region of `len` bytes starting `offset` bytes into this one.
    ///
    /// Returns `None` if the sub-region would extend past this region.
    pub fn slice(&self, offset: usize, len: usize) -> Option<Region> {
        let end = offset.checked_add(len)?;
        if end > self.len {
            return None;
        }
        let location = match self.location {
            RegionLocation::Block { block, offset: base } => RegionLocation::Block {
                block,
                offset: base + offset,
            },
            RegionLocation::Large {
                slot,
                serial,
                offset: base,
            } => RegionLocation::Large {
                slot,
                serial,
                offset: base + offset,
            },
        };
        Some(Self {
            pool: self.pool,
            generation: self.generation,
            len,
            location,
        })
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Region(pool={}, gen={}, len={}, {:?})",
            self.pool, self.generation, self.len, self.location
        )
    }
}

/// Describes where a [`Region`]'s bytes live.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegionLocation {
    /// Bump-allocated inside a block of the chain.
    Block {
        /// The block holding the bytes.
        block: BlockId,
        /// Offset from the block's aligned base.
        offset: usize,
    },
    /// A tracked large allocation.
    Large {
        /// The record that owns the allocation.
        slot: SlotId,
        /// Allocation serial; distinguishes reuses of the same record.
        serial: u64,
        /// Offset from the start of the allocation.
        offset: usize,
    },
}
