//! Tracking for allocations too big for bump allocation.
//!
//! Each large allocation is its own system buffer, recorded in a
//! [`LargeList`] so the pool can release it early (`free`), on reset, or on
//! destroy. A record whose buffer was freed becomes a tombstone and may be
//! refilled by a later large allocation.

use smallvec::SmallVec;

use corral_core::{PoolError, SlotId, SystemAllocator};

/// One system buffer holding a large allocation.
pub(crate) struct LargeBuf {
    /// Backing storage, over-allocated so that `offset` can be aligned.
    storage: Vec<u8>,
    /// Index of the first byte of the allocation within `storage`.
    offset: usize,
    /// Requested length in bytes.
    len: usize,
}

impl LargeBuf {
    /// Allocate `len` bytes whose first byte is `alignment`-aligned.
    pub(crate) fn allocate(
        system: &dyn SystemAllocator,
        len: usize,
        alignment: usize,
    ) -> Result<Self, PoolError> {
        let padded = len
            .checked_add(alignment - 1)
            .ok_or(PoolError::OutOfMemory { requested: len })?;
        let storage = system.allocate(padded)?;
        let offset = storage
            .as_ptr()
            .align_offset(alignment)
            .min(storage.len() - len);
        Ok(Self {
            storage,
            offset,
            len,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Index in `storage` of the byte at `offset` into the allocation.
    pub(crate) fn storage_index(&self, offset: usize) -> usize {
        self.offset + offset
    }

    pub(crate) fn storage(&self) -> &[u8] {
        &self.storage
    }

    pub(crate) fn storage_mut(&mut self) -> &mut [u8] {
        &mut self.storage
    }

    pub(crate) fn memory_bytes(&self) -> usize {
        self.storage.len()
    }
}

/// A large-allocation record. `buf == None` marks a tombstone.
pub(crate) struct LargeRecord {
    serial: u64,
    buf: Option<LargeBuf>,
}

/// The pool's list of large-allocation records.
///
/// Logically a singly-linked list with new records at the head; stored as a
/// vector whose last element is the head. Slot ids are vector indices and
/// stay valid until the list is cleared.
#[derive(Default)]
pub(crate) struct LargeList {
    records: SmallVec<[LargeRecord; 2]>,
}

impl LargeList {
    /// Create an empty list.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Find a tombstone among the first `probes` records from the head.
    pub(crate) fn find_reusable(&self, probes: usize) -> Option<SlotId> {
        self.records
            .iter()
            .enumerate()
            .rev()
            .take(probes)
            .find(|(_, record)| record.buf.is_none())
            .map(|(index, _)| SlotId(index as u32))
    }

    /// Store `buf` in the tombstoned record `slot`.
    pub(crate) fn fill(&mut self, slot: SlotId, serial: u64, buf: LargeBuf) {
        let record = &mut self.records[slot.index()];
        debug_assert!(record.buf.is_none(), "refilling a live large record");
        record.serial = serial;
        record.buf = Some(buf);
    }

    /// Prepend a new record holding `buf`.
    pub(crate) fn push(&mut self, serial: u64, buf: LargeBuf) -> SlotId {
        self.records.push(LargeRecord {
            serial,
            buf: Some(buf),
        });
        SlotId(self.records.len() as u32 - 1)
    }

    /// Release the allocation `slot` holds, tombstoning its record.
    ///
    /// The record must still hold `serial`. Returns the number of bytes
    /// released, or `None` if it does not or is already a tombstone.
    pub(crate) fn release(&mut self, slot: SlotId, serial: u64) -> Option<usize> {
        let record = self
            .records
            .get_mut(slot.index())
            .filter(|record| record.serial == serial)?;
        record.buf.take().map(|buf| buf.len())
    }

    /// Resolve a live allocation, checking that `slot` still holds `serial`.
    pub(crate) fn get(&self, slot: SlotId, serial: u64) -> Result<&LargeBuf, PoolError> {
        self.records
            .get(slot.index())
            .filter(|record| record.serial == serial)
            .and_then(|record| record.buf.as_ref())
            .ok_or(PoolError::ReleasedRegion { serial })
    }

    pub(crate) fn records(&self) -> &[LargeRecord] {
        &self.records
    }

    pub(crate) fn records_mut(&mut self) -> &mut [LargeRecord] {
        &mut self.records
    }

    /// Drop every record, releasing all live buffers.
    ///
    /// Returns the number of live buffers released.
    pub(crate) fn clear(&mut self) -> usize {
        let live = self.live();
        self.records.clear();
        live
    }

    /// Serials and lengths of live allocations, head first.
    pub(crate) fn live_allocations(&self) -> impl Iterator<Item = (u64, usize)> + '_ {
        self.records
            .iter()
            .rev()
            .filter_map(|record| record.buf.as_ref().map(|buf| (record.serial, buf.len())))
    }

    /// Number of records, tombstones included.
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Number of records holding a live allocation.
    pub(crate) fn live(&self) -> usize {
        self.records.iter().filter(|r| r.buf.is_some()).count()
    }

    /// Memory held by live allocations in bytes.
    pub(crate) fn memory_bytes(&self) -> usize {
        self.records
            .iter()
            .filter_map(|r| r.buf.as_ref())
            .map(LargeBuf::memory_bytes)
            .sum()
    }
}

impl LargeRecord {
    /// Backing storage of the live buffer; empty for a tombstone.
    pub(crate) fn storage(&self) -> &[u8] {
        match &self.buf {
            Some(buf) => buf.storage(),
            None => &[],
        }
    }

    pub(crate) fn storage_mut(&mut self) -> &mut [u8] {
        match &mut self.buf {
            Some(buf) => buf.storage_mut(),
            None => &mut [],
        }
    }
}
