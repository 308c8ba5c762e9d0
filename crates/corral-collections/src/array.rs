//! Growable array backed by pool memory.

use corral_core::PoolError;
use corral_pool::{Pool, Region};

use crate::{byte_size, check_layout};

/// A growable array of fixed-size elements.
///
/// Storage is one contiguous region of `capacity * elem_size` bytes. When
/// the array is full and its storage is still the latest allocation in the
/// pool's current block, growth extends the region in place and element
/// regions stay valid. Otherwise the contents move to a fresh region of twice the
/// capacity, and previously returned element regions keep pointing at the
/// old copy.
///
/// # Example
///
/// ```
/// use corral_collections::Array;
/// use corral_pool::Pool;
///
/// let mut pool = Pool::with_size(4096)?;
/// let mut headers = Array::new(&mut pool, 2, 4)?;
/// let slot = headers.push(&mut pool)?;
/// pool.bytes_mut(slot)?.copy_from_slice(b"Host");
/// assert_eq!(headers.get(&pool, 0)?, Some(&b"Host"[..]));
/// # Ok::<(), corral_core::PoolError>(())
/// ```
#[derive(Debug, PartialEq, Eq)]
pub struct Array {
    storage: Region,
    elem_size: usize,
    len: usize,
    capacity: usize,
}

impl Array {
    /// Allocate room for `capacity` elements of `elem_size` bytes.
    ///
    /// Returns `Err(PoolError::InvalidConfig)` for a zero capacity or zero
    /// element size.
    pub fn new(pool: &mut Pool, capacity: usize, elem_size: usize) -> Result<Self, PoolError> {
        check_layout(capacity, elem_size)?;
        let storage = pool.alloc(byte_size(capacity, elem_size)?)?;
        Ok(Self {
            storage,
            elem_size,
            len: 0,
            capacity,
        })
    }

    /// Append one element and return its slot.
    pub fn push(&mut self, pool: &mut Pool) -> Result<Region, PoolError> {
        if self.len == self.capacity {
            if pool.grow_in_place(&mut self.storage, self.elem_size) {
                self.capacity += 1;
            } else {
                self.relocate(pool, self.capacity * 2)?;
            }
        }
        let slot = self.slots(self.len, 1)?;
        self.len += 1;
        Ok(slot)
    }

    /// Append `count` elements and return the region covering their slots.
    ///
    /// Either all `count` slots are added or, on error, none are.
    pub fn push_n(&mut self, pool: &mut Pool, count: usize) -> Result<Region, PoolError> {
        if count > self.capacity - self.len {
            let extra = byte_size(count, self.elem_size)?;
            if pool.grow_in_place(&mut self.storage, extra) {
                self.capacity += count;
            } else {
                let capacity = count.max(self.capacity).checked_mul(2).ok_or(
                    PoolError::OutOfMemory {
                        requested: usize::MAX,
                    },
                )?;
                self.relocate(pool, capacity)?;
            }
        }
        let slots = self.slots(self.len, count)?;
        self.len += count;
        Ok(slots)
    }

    /// Move the contents into a fresh region of `capacity` elements.
    fn relocate(&mut self, pool: &mut Pool, capacity: usize) -> Result<(), PoolError> {
        let storage = pool.alloc(byte_size(capacity, self.elem_size)?)?;
        pool.copy(self.storage, storage)?;
        tracing::trace!(
            parent: pool.span(),
            from = self.capacity,
            to = capacity,
            elem_size = self.elem_size,
            "array copied"
        );
        self.storage = storage;
        self.capacity = capacity;
        Ok(())
    }

    /// Give the storage back to the pool if it is still the latest
    /// allocation in the current block. Returns whether anything was given
    /// back.
    pub fn destroy(self, pool: &mut Pool) -> bool {
        pool.give_back(self.storage)
    }

    /// Region of the element at `index`, if it exists.
    pub fn slot(&self, index: usize) -> Option<Region> {
        if index >= self.len {
            return None;
        }
        self.storage.slice(index * self.elem_size, self.elem_size)
    }

    fn slots(&self, first: usize, count: usize) -> Result<Region, PoolError> {
        let offset = byte_size(first, self.elem_size)?;
        let len = byte_size(count, self.elem_size)?;
        self.storage
            .slice(offset, len)
            .ok_or(PoolError::RegionTooSmall {
                needed: offset + len,
                available: self.storage.len(),
            })
    }

    /// Bytes of the element at `index`, or `None` past the end.
    pub fn get<'p>(&self, pool: &'p Pool, index: usize) -> Result<Option<&'p [u8]>, PoolError> {
        self.slot(index).map(|slot| pool.bytes(slot)).transpose()
    }

    /// Bytes of all elements, in order.
    pub fn as_bytes<'p>(&self, pool: &'p Pool) -> Result<&'p [u8], PoolError> {
        let bytes = pool.bytes(self.storage)?;
        Ok(&bytes[..self.len * self.elem_size])
    }

    /// The backing storage, sized to the full capacity.
    pub fn storage(&self) -> Region {
        self.storage
    }

    /// Number of elements pushed.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no elements have been pushed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of elements the current storage holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Size of one element in bytes.
    pub fn elem_size(&self) -> usize {
        self.elem_size
    }
}
