//! Chunked list: a chain of fixed-capacity parts.

use smallvec::SmallVec;

use corral_core::PoolError;
use corral_pool::{Pool, Region};

use crate::{byte_size, check_layout};

/// One fixed-capacity chunk of a [`List`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Part {
    storage: Region,
    len: usize,
}

impl Part {
    /// The part's storage, sized to the full part capacity.
    pub fn storage(&self) -> Region {
        self.storage
    }

    /// Number of elements stored in this part.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the part holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// An append-only list whose elements never move.
///
/// Elements live in parts of `part_capacity` elements each. A full tail
/// part is never grown or copied; a new part is chained after it instead,
/// so every slot returned by [`push`](List::push) stays valid until the
/// pool is reset or dropped.
#[derive(Debug)]
pub struct List {
    parts: SmallVec<[Part; 4]>,
    part_capacity: usize,
    elem_size: usize,
}

impl List {
    /// Create a list and allocate its first part.
    ///
    /// Returns `Err(PoolError::InvalidConfig)` for a zero part capacity or
    /// zero element size.
    pub fn new(pool: &mut Pool, part_capacity: usize, elem_size: usize) -> Result<Self, PoolError> {
        check_layout(part_capacity, elem_size)?;
        let storage = pool.alloc(byte_size(part_capacity, elem_size)?)?;
        let mut parts = SmallVec::new();
        parts.push(Part { storage, len: 0 });
        Ok(Self {
            parts,
            part_capacity,
            elem_size,
        })
    }

    /// Append one element and return its slot.
    pub fn push(&mut self, pool: &mut Pool) -> Result<Region, PoolError> {
        // `parts` always holds the first part.
        let mut tail = self.parts.len() - 1;
        if self.parts[tail].len == self.part_capacity {
            let storage = pool.alloc(byte_size(self.part_capacity, self.elem_size)?)?;
            self.parts.push(Part { storage, len: 0 });
            tail += 1;
            tracing::trace!(parent: pool.span(), parts = self.parts.len(), "list part added");
        }
        let elem_size = self.elem_size;
        let part = &mut self.parts[tail];
        let slot = part
            .storage
            .slice(part.len * elem_size, elem_size)
            .ok_or(PoolError::RegionTooSmall {
                needed: (part.len + 1) * elem_size,
                available: part.storage.len(),
            })?;
        part.len += 1;
        Ok(slot)
    }

    /// Element slots in insertion order, across all parts.
    pub fn iter(&self) -> impl Iterator<Item = Region> + '_ {
        let elem_size = self.elem_size;
        self.parts.iter().flat_map(move |part| {
            (0..part.len).filter_map(move |i| part.storage.slice(i * elem_size, elem_size))
        })
    }

    /// The parts, first to last.
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.parts.iter().map(|part| part.len).sum()
    }

    /// Whether no elements have been pushed.
    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(Part::is_empty)
    }

    /// Number of parts allocated so far.
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Elements per part.
    pub fn part_capacity(&self) -> usize {
        self.part_capacity
    }

    /// Size of one element in bytes.
    pub fn elem_size(&self) -> usize {
        self.elem_size
    }
}
