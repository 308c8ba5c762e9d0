//! The pool: one owner for blocks, large allocations, and cleanups.
//!
//! [`Pool`] is the top-level type. Requests up to
//! [`max_small`](Pool::max_small) bytes are bump-allocated from the block
//! chain; larger ones get their own system buffer, tracked so they can be
//! released early with [`free`](Pool::free). [`reset`](Pool::reset) rewinds
//! everything for reuse without running cleanups; dropping the pool (or
//! calling [`destroy`](Pool::destroy)) runs cleanups and releases it all.
//!
//! ```text
//! Pool
//! ├── BlockChain → Block[] (bump cursor, failure counter, `current` skip)
//! ├── LargeList  → LargeRecord[] (live buffer or tombstone)
//! ├── CleanupList → CleanupEntry[] (run head first on destroy)
//! └── Span (diagnostic sink)
//! ```

use std::fmt;
use std::os::fd::RawFd;

use corral_core::{is_valid_alignment, BlockId, Heap, PoolError, PoolId, Release, SystemAllocator};
use tracing::Span;

use crate::block::{BlockChain, BlockStats, Mark};
use crate::cleanup::{CleanupAction, CleanupHandle, CleanupList, FileCleanup};
use crate::config::PoolConfig;
use crate::handle::{Region, RegionLocation};
use crate::large::{LargeBuf, LargeList};

/// Region-based memory pool.
///
/// A pool is owned and mutated by one logical owner at a time. It is `Send`
/// but not `Sync`; sharing one across threads needs an outer lock.
///
/// # Example
///
/// ```
/// use corral_pool::{Pool, PoolConfig};
///
/// let mut pool = Pool::new(PoolConfig::default())?;
/// let small = pool.alloc(64)?;
/// pool.bytes_mut(small)?.copy_from_slice(&[7; 64]);
///
/// let big = pool.alloc(64 * 1024)?;
/// assert!(big.is_large());
/// assert!(pool.free(big).is_released());
///
/// pool.reset();
/// assert!(pool.bytes(small).is_err());
/// # Ok::<(), corral_core::PoolError>(())
/// ```
pub struct Pool {
    /// Stamped on every region this pool mints.
    id: PoolId,
    config: PoolConfig,
    /// Largest request served by bump allocation.
    max_small: usize,
    chain: BlockChain,
    large: LargeList,
    cleanups: CleanupList,
    system: Box<dyn SystemAllocator>,
    /// Incremented by every reset; regions from older generations are stale.
    generation: u32,
    /// Serial handed to the next large allocation.
    next_serial: u64,
    span: Span,
}

/// Which container a resolved region's bytes live in.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Place {
    Block(usize),
    Large(usize),
}

impl Pool {
    /// Create a pool backed by the global heap.
    ///
    /// Returns `Err(PoolError::InvalidConfig)` if `config` fails validation,
    /// or `Err(PoolError::OutOfMemory)` if the first block cannot be allocated.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        Self::with_allocator(config, Box::new(Heap))
    }

    /// Create a pool of `size`-byte blocks with default settings otherwise.
    pub fn with_size(size: usize) -> Result<Self, PoolError> {
        Self::new(PoolConfig::new(size))
    }

    /// Create a pool that obtains all memory from `system`.
    pub fn with_allocator(
        config: PoolConfig,
        system: Box<dyn SystemAllocator>,
    ) -> Result<Self, PoolError> {
        config.validate()?;
        let chain = BlockChain::new(&*system, config.size)?;
        let max_small = config.max_small();
        let id = PoolId::next();
        let span = tracing::debug_span!("pool", id = %id, size = config.size);
        tracing::debug!(parent: &span, size = config.size, max_small, "create pool");
        Ok(Self {
            id,
            config,
            max_small,
            chain,
            large: LargeList::new(),
            cleanups: CleanupList::new(),
            system,
            generation: 0,
            next_serial: 1,
            span,
        })
    }

    /// Replace the pool's diagnostic span.
    ///
    /// Every event the pool emits is parented to this span, typically the
    /// span of the connection or request that owns the pool.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Allocate `size` bytes, word-aligned when bump-allocated.
    pub fn alloc(&mut self, size: usize) -> Result<Region, PoolError> {
        if size <= self.max_small && !self.config.force_large {
            return self.alloc_small(size, true);
        }
        self.alloc_large(size)
    }

    /// Allocate `size` bytes without aligning the bump cursor.
    ///
    /// For byte-granular data such as strings.
    pub fn alloc_unaligned(&mut self, size: usize) -> Result<Region, PoolError> {
        if size <= self.max_small && !self.config.force_large {
            return self.alloc_small(size, false);
        }
        self.alloc_large(size)
    }

    /// Allocate `size` zero-filled bytes.
    ///
    /// Bump memory may hold data from before a reset, so the region is
    /// always cleared explicitly.
    pub fn alloc_zeroed(&mut self, size: usize) -> Result<Region, PoolError> {
        let region = self.alloc(size)?;
        self.bytes_mut(region)?.fill(0);
        Ok(region)
    }

    /// Allocate `size` bytes aligned to `alignment`, always as a tracked
    /// large allocation that can be released with [`free`](Pool::free).
    pub fn alloc_aligned(&mut self, size: usize, alignment: usize) -> Result<Region, PoolError> {
        if !is_valid_alignment(alignment) {
            return Err(PoolError::InvalidAlignment { alignment });
        }
        let buf = LargeBuf::allocate(&*self.system, size, alignment)?;
        let serial = self.take_serial();
        self.track_large(serial, size, buf)
    }

    fn alloc_small(&mut self, size: usize, aligned: bool) -> Result<Region, PoolError> {
        let (offset, mark) = self.bump(size, aligned)?;
        Ok(Region::block(self.id, self.generation, mark.block(), offset, size))
    }

    /// Bump-allocate from the chain, tracing any block appended on the way.
    fn bump(&mut self, size: usize, aligned: bool) -> Result<(usize, Mark), PoolError> {
        let blocks = self.chain.len();
        let (offset, mark) = self.chain.alloc_marked(&*self.system, size, aligned)?;
        if self.chain.len() > blocks {
            tracing::trace!(parent: &self.span, block = %mark.block(), "appended pool block");
        }
        Ok((offset, mark))
    }

    fn alloc_large(&mut self, size: usize) -> Result<Region, PoolError> {
        let buf = LargeBuf::allocate(&*self.system, size, PoolConfig::POOL_ALIGNMENT)?;
        let serial = self.take_serial();

        if let Some(slot) = self.large.find_reusable(PoolConfig::LARGE_REUSE_PROBES) {
            self.large.fill(slot, serial, buf);
            tracing::trace!(parent: &self.span, serial, size, %slot, "reuse large record");
            return Ok(Region::large(self.id, self.generation, slot, serial, size));
        }
        self.track_large(serial, size, buf)
    }

    /// Record `buf` under a new large record at the head of the list.
    ///
    /// The record costs bump space. If that allocation fails, `buf` is
    /// dropped here and nothing is recorded.
    fn track_large(
        &mut self,
        serial: u64,
        size: usize,
        buf: LargeBuf,
    ) -> Result<Region, PoolError> {
        self.bump(PoolConfig::LARGE_RECORD_SIZE, true)?;
        let slot = self.large.push(serial, buf);
        tracing::trace!(parent: &self.span, serial, size, %slot, "alloc large");
        Ok(Region::large(self.id, self.generation, slot, serial, size))
    }

    fn take_serial(&mut self) -> u64 {
        let serial = self.next_serial;
        self.next_serial += 1;
        serial
    }

    /// Release a large allocation early.
    ///
    /// Returns [`Release::NotTracked`] for anything that is not the start of
    /// a live large allocation of this pool in its current generation,
    /// including all bump-allocated regions.
    pub fn free(&mut self, region: Region) -> Release {
        if region.pool != self.id || region.generation != self.generation {
            return Release::NotTracked;
        }
        let RegionLocation::Large {
            slot,
            serial,
            offset: 0,
        } = region.location
        else {
            return Release::NotTracked;
        };
        match self.large.release(slot, serial) {
            Some(len) => {
                tracing::trace!(parent: &self.span, serial, len, %slot, "free large");
                Release::Released
            }
            None => Release::NotTracked,
        }
    }

    /// Release all large allocations and rewind every block.
    ///
    /// Cleanups are neither run nor removed. Every region handed out so far
    /// becomes stale.
    pub fn reset(&mut self) {
        for (serial, len) in self.large.live_allocations() {
            tracing::trace!(parent: &self.span, serial, len, "free large");
        }
        let released = self.large.clear();
        self.chain.reset();
        self.generation = self.generation.wrapping_add(1);
        tracing::debug!(
            parent: &self.span,
            released,
            blocks = self.chain.len(),
            generation = self.generation,
            "reset pool"
        );
    }

    /// Run cleanups and release every allocation and block.
    ///
    /// Equivalent to dropping the pool; the pool cannot be used afterwards.
    pub fn destroy(self) {
        drop(self);
    }

    /// Register a cleanup with a data buffer of `size` bytes.
    ///
    /// The handle has no action until [`set_cleanup`](Pool::set_cleanup)
    /// installs one. Cleanups run most recently registered first.
    ///
    /// The record is always bump-allocated. If the data buffer cannot be
    /// allocated, the record's space is rolled back and nothing is registered.
    pub fn add_cleanup(&mut self, size: usize) -> Result<CleanupHandle, PoolError> {
        let (_, record) = self.bump(PoolConfig::CLEANUP_RECORD_SIZE, true)?;
        let data = if size > 0 {
            match self.alloc(size) {
                Ok(region) => Some(region),
                Err(err) => {
                    self.chain.rewind_to(record);
                    return Err(err);
                }
            }
        } else {
            None
        };
        let handle = self.cleanups.push(data);
        tracing::debug!(parent: &self.span, cleanup = %handle, size, "add cleanup");
        Ok(handle)
    }

    /// Install the action a cleanup runs. Returns `false` for an unknown handle.
    pub fn set_cleanup(&mut self, handle: CleanupHandle, action: CleanupAction) -> bool {
        self.cleanups.set(handle, action)
    }

    /// The data buffer of a cleanup; empty if it was registered without one.
    pub fn cleanup_data_mut(&mut self, handle: CleanupHandle) -> Result<&mut [u8], PoolError> {
        match self.cleanups.data(handle) {
            Some(region) => self.bytes_mut(region),
            None => Ok(&mut []),
        }
    }

    /// Register a cleanup that closes `file`.
    pub fn add_file_cleanup(&mut self, file: FileCleanup) -> Result<CleanupHandle, PoolError> {
        let handle = self.add_cleanup(0)?;
        self.cleanups.set(handle, CleanupAction::CloseFile(file));
        Ok(handle)
    }

    /// Register a cleanup that deletes and closes `file`.
    pub fn add_delete_file_cleanup(
        &mut self,
        file: FileCleanup,
    ) -> Result<CleanupHandle, PoolError> {
        let handle = self.add_cleanup(0)?;
        self.cleanups.set(handle, CleanupAction::DeleteFile(file));
        Ok(handle)
    }

    /// Close the file registered for `fd` now instead of at destroy.
    ///
    /// Only close-file cleanups match. Returns whether one ran.
    pub fn run_file_cleanup(&mut self, fd: RawFd) -> bool {
        match self.cleanups.take_close_file(fd) {
            Some(action) => {
                action.run(&mut [], &self.span);
                true
            }
            None => false,
        }
    }

    /// Extend `region` by `extra` bytes without moving it.
    ///
    /// Succeeds only if `region` lives in the current block, is that
    /// block's most recent allocation, and the block has room;
    /// `region.len()` grows on success. A region in any other block is
    /// refused even if it ends at its block's cursor.
    pub fn grow_in_place(&mut self, region: &mut Region, extra: usize) -> bool {
        let Some(offset) = self.current_block_offset(region) else {
            return false;
        };
        let current = self.chain.current();
        let Some(b) = self.chain.get_mut(current) else {
            return false;
        };
        if !b.try_extend(offset, region.len, extra) {
            return false;
        }
        region.len += extra;
        true
    }

    /// Return `region`'s bytes if it is the most recent allocation in the
    /// current block. Returns whether anything was given back.
    pub fn give_back(&mut self, region: Region) -> bool {
        let Some(offset) = self.current_block_offset(&region) else {
            return false;
        };
        let current = self.chain.current();
        self.chain
            .get_mut(current)
            .is_some_and(|b| b.give_back(offset, region.len))
    }

    /// Block offset of `region` if it is a live bump allocation of this pool
    /// in the current block.
    fn current_block_offset(&self, region: &Region) -> Option<usize> {
        if region.pool != self.id || region.generation != self.generation {
            return None;
        }
        match region.location {
            RegionLocation::Block { block, offset } if block == self.chain.current() => {
                Some(offset)
            }
            _ => None,
        }
    }

    /// Copy all of `src` to the start of `dst`.
    pub fn copy(&mut self, src: Region, dst: Region) -> Result<(), PoolError> {
        if dst.len < src.len {
            return Err(PoolError::RegionTooSmall {
                needed: src.len,
                available: dst.len,
            });
        }
        let (src_place, from) = self.locate(src)?;
        let (dst_place, to) = self.locate(dst)?;
        let len = src.len;
        if src_place == dst_place {
            self.storage_mut(src_place).copy_within(from..from + len, to);
            return Ok(());
        }
        let (src_bytes, dst_bytes) = self.storage_pair(src_place, dst_place);
        dst_bytes[to..to + len].copy_from_slice(&src_bytes[from..from + len]);
        Ok(())
    }

    /// Resolve a region to its bytes.
    pub fn bytes(&self, region: Region) -> Result<&[u8], PoolError> {
        let (place, start) = self.locate(region)?;
        Ok(&self.storage(place)[start..start + region.len])
    }

    /// Resolve a region to its bytes, mutably.
    pub fn bytes_mut(&mut self, region: Region) -> Result<&mut [u8], PoolError> {
        let (place, start) = self.locate(region)?;
        Ok(&mut self.storage_mut(place)[start..start + region.len])
    }

    /// Validate `region` and find the storage index of its first byte.
    fn locate(&self, region: Region) -> Result<(Place, usize), PoolError> {
        if region.pool != self.id {
            return Err(PoolError::ForeignRegion);
        }
        if region.generation != self.generation {
            return Err(PoolError::StaleRegion {
                region_generation: region.generation,
                pool_generation: self.generation,
            });
        }
        match region.location {
            RegionLocation::Block { block, offset } => {
                let b = self
                    .chain
                    .get(block)
                    .filter(|b| b.contains(offset, region.len))
                    .ok_or(PoolError::ForeignRegion)?;
                Ok((Place::Block(block.index()), b.storage_index(offset)))
            }
            RegionLocation::Large {
                slot,
                serial,
                offset,
            } => {
                let buf = self.large.get(slot, serial)?;
                if offset
                    .checked_add(region.len)
                    .map_or(true, |end| end > buf.len())
                {
                    return Err(PoolError::ForeignRegion);
                }
                Ok((Place::Large(slot.index()), buf.storage_index(offset)))
            }
        }
    }

    fn storage(&self, place: Place) -> &[u8] {
        match place {
            Place::Block(i) => self.chain.blocks()[i].storage(),
            Place::Large(i) => self.large.records()[i].storage(),
        }
    }

    fn storage_mut(&mut self, place: Place) -> &mut [u8] {
        match place {
            Place::Block(i) => self.chain.blocks_mut()[i].storage_mut(),
            Place::Large(i) => self.large.records_mut()[i].storage_mut(),
        }
    }

    /// Borrow two distinct storages, the first shared and the second mutable.
    fn storage_pair(&mut self, src: Place, dst: Place) -> (&[u8], &mut [u8]) {
        match (src, dst) {
            (Place::Block(a), Place::Block(b)) => {
                let (a, b) = pair_mut(self.chain.blocks_mut(), a, b);
                (a.storage(), b.storage_mut())
            }
            (Place::Large(a), Place::Large(b)) => {
                let (a, b) = pair_mut(self.large.records_mut(), a, b);
                (a.storage(), b.storage_mut())
            }
            (Place::Block(a), Place::Large(b)) => (
                self.chain.blocks()[a].storage(),
                self.large.records_mut()[b].storage_mut(),
            ),
            (Place::Large(a), Place::Block(b)) => (
                self.large.records()[a].storage(),
                self.chain.blocks_mut()[b].storage_mut(),
            ),
        }
    }

    /// This pool's identity; every region it mints carries it.
    pub fn id(&self) -> PoolId {
        self.id
    }

    /// The configuration this pool was created with.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Largest request served by bump allocation.
    pub fn max_small(&self) -> usize {
        self.max_small
    }

    /// Number of resets so far; regions carry the generation they were minted in.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// The pool's diagnostic span.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// The block chain, for inspection.
    pub fn chain(&self) -> &BlockChain {
        &self.chain
    }

    /// Number of blocks in the chain.
    pub fn block_count(&self) -> usize {
        self.chain.len()
    }

    /// The block small allocations start from.
    pub fn current_block(&self) -> BlockId {
        self.chain.current()
    }

    /// Counters for one block.
    pub fn block_stats(&self, id: BlockId) -> Option<BlockStats> {
        self.chain.get(id).map(|b| b.stats())
    }

    /// Length of the large-record list, tombstones included.
    pub fn large_count(&self) -> usize {
        self.large.len()
    }

    /// Number of live large allocations.
    pub fn live_large_count(&self) -> usize {
        self.large.live()
    }

    /// Number of cleanups ever registered.
    pub fn cleanup_count(&self) -> usize {
        self.cleanups.len()
    }

    /// Number of cleanups that still have an action to run.
    pub fn pending_cleanups(&self) -> usize {
        self.cleanups.pending()
    }

    /// Bytes handed out by bump allocation since the last reset.
    pub fn used_bytes(&self) -> usize {
        self.chain.total_used()
    }

    /// Memory held from the system allocator, blocks and large buffers.
    pub fn memory_bytes(&self) -> usize {
        self.chain.memory_bytes() + self.large.memory_bytes()
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        let span = self.span.clone();
        for (handle, action, data) in self.cleanups.drain() {
            tracing::debug!(parent: &span, cleanup = %handle, "run cleanup");
            let Some(region) = data else {
                action.run(&mut [], &span);
                continue;
            };
            match self.bytes_mut(region) {
                Ok(bytes) => action.run(bytes, &span),
                Err(err) => {
                    tracing::warn!(
                        parent: &span,
                        cleanup = %handle,
                        error = %err,
                        "cleanup data did not survive reset"
                    );
                    action.run(&mut [], &span);
                }
            }
        }

        for (serial, len) in self.large.live_allocations() {
            tracing::trace!(parent: &span, serial, len, "free large");
        }
        for (id, block) in self.chain.iter() {
            tracing::debug!(parent: &span, block = %id, unused = block.remaining(), "free block");
        }
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("generation", &self.generation)
            .field("blocks", &self.chain.len())
            .field("current", &self.chain.current())
            .field("large", &self.large.len())
            .field("cleanups", &self.cleanups.len())
            .field("system", &self.system)
            .finish()
    }
}

/// Split borrow of two distinct elements.
fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&T, &mut T) {
    debug_assert_ne!(a, b);
    if a < b {
        let (lo, hi) = items.split_at_mut(b);
        (&lo[a], &mut hi[0])
    } else {
        let (lo, hi) = items.split_at_mut(a);
        (&hi[0], &mut lo[b])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_core::SlotId;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tracing_test::traced_test;

    fn pool() -> Pool {
        Pool::new(PoolConfig::default()).unwrap()
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> CleanupAction {
        let log = Arc::clone(log);
        CleanupAction::callback(move |_| {
            log.lock().unwrap().push(tag);
            Ok(())
        })
    }

    #[test]
    fn first_allocation_follows_header() {
        let mut pool = pool();
        let r = pool.alloc(10).unwrap();
        assert_eq!(
            r.location(),
            RegionLocation::Block {
                block: BlockId::FIRST,
                offset: PoolConfig::POOL_HEADER_SIZE
            }
        );
    }

    #[test]
    fn aligned_allocations_are_word_aligned() {
        let mut pool = pool();
        let _ = pool.alloc_unaligned(3).unwrap();
        let r = pool.alloc(16).unwrap();
        let addr = pool.bytes(r).unwrap().as_ptr() as usize;
        assert_eq!(addr % PoolConfig::ALIGNMENT, 0);
    }

    #[test]
    fn unaligned_allocations_are_packed() {
        let mut pool = pool();
        let a = pool.alloc_unaligned(3).unwrap();
        let b = pool.alloc_unaligned(5).unwrap();
        let a_end = pool.bytes(a).unwrap().as_ptr() as usize + 3;
        assert_eq!(pool.bytes(b).unwrap().as_ptr() as usize, a_end);
    }

    #[test]
    fn threshold_routes_small_and_large() {
        let mut pool = pool();
        let max = pool.max_small();
        let small = pool.alloc(max).unwrap();
        let large = pool.alloc(max + 1).unwrap();
        assert!(!small.is_large());
        assert!(large.is_large());
        assert_eq!(pool.large_count(), 1);
    }

    #[test]
    fn force_large_routes_everything_large() {
        let config = PoolConfig {
            force_large: true,
            ..PoolConfig::default()
        };
        let mut pool = Pool::new(config).unwrap();
        let r = pool.alloc(8).unwrap();
        assert!(r.is_large());
        assert!(pool.free(r).is_released());
    }

    #[test]
    fn written_bytes_read_back() {
        let mut pool = pool();
        let r = pool.alloc(4).unwrap();
        pool.bytes_mut(r).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(pool.bytes(r).unwrap(), &[1, 2, 3, 4]);
    }

    #[test]
    fn zeroed_alloc_clears_reused_memory() {
        let mut pool = pool();
        let r = pool.alloc(32).unwrap();
        pool.bytes_mut(r).unwrap().fill(0xAA);
        pool.reset();
        let z = pool.alloc_zeroed(32).unwrap();
        assert!(pool.bytes(z).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn free_bump_region_is_not_tracked() {
        let mut pool = pool();
        let r = pool.alloc(16).unwrap();
        assert_eq!(pool.free(r), Release::NotTracked);
    }

    #[test]
    fn free_twice_is_not_tracked_second_time() {
        let mut pool = pool();
        let r = pool.alloc(10_000).unwrap();
        assert_eq!(pool.free(r), Release::Released);
        assert_eq!(pool.free(r), Release::NotTracked);
        assert_eq!(
            pool.bytes(r).unwrap_err(),
            PoolError::ReleasedRegion { serial: 1 }
        );
    }

    #[test]
    fn freeing_a_sub_region_is_not_tracked() {
        let mut pool = pool();
        let r = pool.alloc(10_000).unwrap();
        let inner = r.slice(8, 8).unwrap();
        assert_eq!(pool.free(inner), Release::NotTracked);
        assert_eq!(pool.live_large_count(), 1);
    }

    #[test]
    fn freed_record_is_reused() {
        let mut pool = pool();
        let a = pool.alloc(10_000).unwrap();
        let _b = pool.alloc(10_000).unwrap();
        assert_eq!(pool.large_count(), 2);
        assert!(pool.free(a).is_released());
        let c = pool.alloc(20_000).unwrap();
        assert_eq!(pool.large_count(), 2);
        assert!(matches!(
            c.location(),
            RegionLocation::Large { slot: SlotId(0), .. }
        ));
        // The old handle must not resolve to the new allocation.
        assert!(pool.bytes(a).is_err());
        assert!(pool.bytes(c).is_ok());
    }

    #[test]
    fn tombstone_beyond_probe_bound_is_not_reused() {
        let mut pool = pool();
        let first = pool.alloc(5000).unwrap();
        for _ in 0..PoolConfig::LARGE_REUSE_PROBES {
            let _ = pool.alloc(5000).unwrap();
        }
        assert!(pool.free(first).is_released());
        let before = pool.large_count();
        let _ = pool.alloc(5000).unwrap();
        assert_eq!(pool.large_count(), before + 1);
    }

    #[test]
    fn aligned_alloc_is_tracked_and_aligned() {
        let mut pool = pool();
        let r = pool.alloc_aligned(100, 256).unwrap();
        assert!(r.is_large());
        let addr = pool.bytes(r).unwrap().as_ptr() as usize;
        assert_eq!(addr % 256, 0);
        assert!(pool.free(r).is_released());
    }

    #[test]
    fn aligned_alloc_never_reuses_records() {
        let mut pool = pool();
        let a = pool.alloc(5000).unwrap();
        assert!(pool.free(a).is_released());
        let _ = pool.alloc_aligned(64, 64).unwrap();
        assert_eq!(pool.large_count(), 2);
    }

    #[test]
    fn invalid_alignment_is_rejected() {
        let mut pool = pool();
        assert_eq!(
            pool.alloc_aligned(8, 24).unwrap_err(),
            PoolError::InvalidAlignment { alignment: 24 }
        );
        assert_eq!(
            pool.alloc_aligned(8, 0).unwrap_err(),
            PoolError::InvalidAlignment { alignment: 0 }
        );
    }

    #[test]
    fn large_record_consumes_bump_space() {
        let mut pool = pool();
        let before = pool.used_bytes();
        let _ = pool.alloc(8192).unwrap();
        assert_eq!(pool.used_bytes(), before + PoolConfig::LARGE_RECORD_SIZE);
    }

    #[test]
    fn reset_makes_regions_stale_and_rewinds() {
        let mut pool = pool();
        let r = pool.alloc(100).unwrap();
        let _ = pool.alloc(9000).unwrap();
        pool.reset();
        assert_eq!(pool.generation(), 1);
        assert_eq!(pool.used_bytes(), 0);
        assert_eq!(pool.large_count(), 0);
        assert_eq!(
            pool.bytes(r).unwrap_err(),
            PoolError::StaleRegion {
                region_generation: 0,
                pool_generation: 1
            }
        );
        let again = pool.alloc(100).unwrap();
        assert_eq!(again.location(), r.location());
    }

    #[test]
    fn reset_keeps_blocks() {
        let mut pool = Pool::with_size(1024).unwrap();
        for _ in 0..10 {
            let _ = pool.alloc(500).unwrap();
        }
        let blocks = pool.block_count();
        assert!(blocks > 1);
        pool.reset();
        assert_eq!(pool.block_count(), blocks);
        assert_eq!(pool.current_block(), BlockId::FIRST);
    }

    #[test]
    fn reset_does_not_run_cleanups() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pool = pool();
        let h = pool.add_cleanup(0).unwrap();
        pool.set_cleanup(h, recorder(&log, "a"));
        pool.reset();
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(pool.pending_cleanups(), 1);
        pool.destroy();
        assert_eq!(*log.lock().unwrap(), vec!["a"]);
    }

    #[test]
    fn cleanups_run_in_reverse_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pool = pool();
        for tag in ["a", "b", "c"] {
            let h = pool.add_cleanup(0).unwrap();
            pool.set_cleanup(h, recorder(&log, tag));
        }
        drop(pool);
        assert_eq!(*log.lock().unwrap(), vec!["c", "b", "a"]);
    }

    #[test]
    fn cleanup_receives_its_data_buffer() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut pool = pool();
        let h = pool.add_cleanup(4).unwrap();
        pool.cleanup_data_mut(h).unwrap().copy_from_slice(&[9, 8, 7, 6]);
        let sink = Arc::clone(&seen);
        pool.set_cleanup(
            h,
            CleanupAction::callback(move |data| {
                sink.lock().unwrap().extend_from_slice(data);
                Ok(())
            }),
        );
        pool.destroy();
        assert_eq!(*seen.lock().unwrap(), vec![9, 8, 7, 6]);
    }

    #[test]
    fn cleanup_without_action_is_skipped() {
        let mut pool = pool();
        pool.add_cleanup(16).unwrap();
        assert_eq!(pool.cleanup_count(), 1);
        assert_eq!(pool.pending_cleanups(), 0);
        pool.destroy();
    }

    #[test]
    fn cleanup_runs_exactly_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut pool = pool();
        let h = pool.add_cleanup(0).unwrap();
        let counter = Arc::clone(&runs);
        pool.set_cleanup(
            h,
            CleanupAction::callback(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        pool.reset();
        pool.reset();
        pool.destroy();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[traced_test]
    #[test]
    fn failing_cleanup_is_logged_and_others_still_run() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pool = pool();
        let h = pool.add_cleanup(0).unwrap();
        pool.set_cleanup(h, recorder(&log, "first"));
        let h = pool.add_cleanup(0).unwrap();
        pool.set_cleanup(
            h,
            CleanupAction::callback(|_| Err(std::io::Error::other("descriptor busy"))),
        );
        pool.destroy();
        assert_eq!(*log.lock().unwrap(), vec!["first"]);
        assert!(logs_contain("cleanup action failed"));
        assert!(logs_contain("descriptor busy"));
    }

    #[traced_test]
    #[test]
    fn cleanup_data_after_reset_is_reported() {
        let mut pool = pool();
        let h = pool.add_cleanup(8).unwrap();
        pool.set_cleanup(
            h,
            CleanupAction::callback(|data| {
                assert!(data.is_empty());
                Ok(())
            }),
        );
        pool.reset();
        pool.destroy();
        assert!(logs_contain("cleanup data did not survive reset"));
    }

    #[test]
    fn set_cleanup_unknown_handle() {
        let mut pool = pool();
        assert!(!pool.set_cleanup(
            corral_core::CleanupId(5),
            CleanupAction::callback(|_| Ok(()))
        ));
    }

    #[test]
    fn grow_in_place_only_for_tail() {
        let mut pool = pool();
        let mut a = pool.alloc(16).unwrap();
        assert!(pool.grow_in_place(&mut a, 16));
        assert_eq!(a.len(), 32);
        let _b = pool.alloc(8).unwrap();
        assert!(!pool.grow_in_place(&mut a, 16));
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn grow_in_place_rejects_large_and_stale() {
        let mut pool = pool();
        let mut big = pool.alloc(9000).unwrap();
        assert!(!pool.grow_in_place(&mut big, 8));
        let mut small = pool.alloc(8).unwrap();
        pool.reset();
        assert!(!pool.grow_in_place(&mut small, 8));
    }

    #[test]
    fn tail_of_non_current_block_is_not_extended() {
        let mut pool = Pool::with_size(1024).unwrap();
        // Leaves 200 bytes in the first block, which stays current.
        let _ = pool.alloc(744).unwrap();
        let mut r = pool.alloc(256).unwrap();
        assert_eq!(r.block_id(), Some(BlockId(1)));
        assert_eq!(pool.current_block(), BlockId::FIRST);
        let used = pool.used_bytes();

        assert!(!pool.grow_in_place(&mut r, 8));
        assert_eq!(r.len(), 256);
        assert!(!pool.give_back(r));
        assert_eq!(pool.used_bytes(), used);
        assert_eq!(pool.bytes(r).unwrap().len(), 256);
    }

    #[test]
    fn give_back_rewinds_tail_allocation() {
        let mut pool = pool();
        let a = pool.alloc(64).unwrap();
        let used = pool.used_bytes();
        assert!(pool.give_back(a));
        assert_eq!(pool.used_bytes(), used - 64);
        let b = pool.alloc(64).unwrap();
        assert_eq!(a.location(), b.location());
        let _c = pool.alloc(8).unwrap();
        assert!(!pool.give_back(b));
    }

    #[test]
    fn copy_within_one_block() {
        let mut pool = pool();
        let a = pool.alloc(4).unwrap();
        let b = pool.alloc(8).unwrap();
        pool.bytes_mut(a).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        pool.copy(a, b).unwrap();
        assert_eq!(&pool.bytes(b).unwrap()[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn copy_between_block_and_large() {
        let mut pool = pool();
        let a = pool.alloc(4).unwrap();
        let big = pool.alloc(8000).unwrap();
        pool.bytes_mut(a).unwrap().copy_from_slice(&[5, 6, 7, 8]);
        pool.copy(a, big).unwrap();
        assert_eq!(&pool.bytes(big).unwrap()[..4], &[5, 6, 7, 8]);

        let other = pool.alloc(9000).unwrap();
        pool.copy(big, other).unwrap();
        assert_eq!(&pool.bytes(other).unwrap()[..4], &[5, 6, 7, 8]);

        let back = pool.alloc(8).unwrap();
        pool.copy(a, back).unwrap();
        assert_eq!(&pool.bytes(back).unwrap()[..4], &[5, 6, 7, 8]);
    }

    #[test]
    fn copy_between_blocks() {
        let mut pool = Pool::with_size(1024).unwrap();
        let a = pool.alloc(900).unwrap();
        pool.bytes_mut(a).unwrap()[0] = 42;
        let b = pool.alloc(900).unwrap();
        assert_ne!(a.block_id(), b.block_id());
        pool.copy(a, b).unwrap();
        assert_eq!(pool.bytes(b).unwrap()[0], 42);
        // And back from the later block into the earlier one.
        pool.bytes_mut(b).unwrap()[1] = 43;
        pool.copy(b, a).unwrap();
        assert_eq!(pool.bytes(a).unwrap()[1], 43);
    }

    #[test]
    fn copy_into_smaller_region_fails() {
        let mut pool = pool();
        let a = pool.alloc(8).unwrap();
        let b = pool.alloc(4).unwrap();
        assert_eq!(
            pool.copy(a, b).unwrap_err(),
            PoolError::RegionTooSmall {
                needed: 8,
                available: 4
            }
        );
    }

    #[test]
    fn region_from_another_pool_is_foreign() {
        let mut small = Pool::with_size(1024).unwrap();
        let mut other = Pool::with_size(1024).unwrap();
        for _ in 0..3 {
            let _ = other.alloc(900).unwrap();
        }
        let r = other.alloc(900).unwrap();
        assert_eq!(small.bytes(r).unwrap_err(), PoolError::ForeignRegion);
        assert!(small.alloc(8).is_ok());
    }

    #[test]
    fn pools_do_not_accept_each_others_regions() {
        let mut a = pool();
        let mut b = pool();
        assert_ne!(a.id(), b.id());
        let mine = a.alloc(10_000).unwrap();
        let theirs = b.alloc(10_000).unwrap();
        // Same slot and serial in both pools; only the owner differs.
        assert_eq!(mine.location(), theirs.location());
        assert_eq!(theirs.pool(), b.id());

        assert_eq!(a.free(theirs), Release::NotTracked);
        assert_eq!(a.bytes(theirs).unwrap_err(), PoolError::ForeignRegion);
        assert_eq!(a.live_large_count(), 1);
        assert_eq!(a.bytes(mine).unwrap().len(), 10_000);
        assert!(b.free(theirs).is_released());

        let mut small = b.alloc(16).unwrap();
        assert!(!a.grow_in_place(&mut small, 8));
        assert!(!a.give_back(small));
        assert_eq!(a.bytes(small).unwrap_err(), PoolError::ForeignRegion);
    }

    #[test]
    fn free_of_region_from_before_reset_is_not_tracked() {
        let mut pool = pool();
        let old = pool.alloc(10_000).unwrap();
        pool.reset();
        let new = pool.alloc(10_000).unwrap();
        assert_eq!(pool.free(old), Release::NotTracked);
        assert_eq!(pool.live_large_count(), 1);
        assert!(pool.free(new).is_released());
    }

    #[traced_test]
    #[test]
    fn appended_block_is_reported_inside_pool_span() {
        let mut pool = Pool::with_size(1024)
            .unwrap()
            .with_span(tracing::info_span!("request", conn = 7));
        let _ = pool.alloc(900).unwrap();
        let _ = pool.alloc(900).unwrap();
        pool.reset();
        logs_assert(|lines: &[&str]| {
            let appended: Vec<_> = lines
                .iter()
                .filter(|line| line.contains("appended pool block"))
                .collect();
            if appended.is_empty() {
                return Err("no block append was logged".to_string());
            }
            if !appended.iter().all(|line| line.contains("request{conn=7}")) {
                return Err(format!("block append outside pool span: {appended:?}"));
            }
            Ok(())
        });
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = Pool::with_size(16).unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig { .. }));
    }

    #[test]
    fn run_file_cleanup_closes_early_and_only_once() {
        let path = std::env::temp_dir().join(format!("corral-pool-{}", std::process::id()));
        let file = std::fs::File::create(&path).unwrap();
        let mut pool = pool();
        let fd = std::os::fd::AsRawFd::as_raw_fd(&file);
        pool.add_file_cleanup(FileCleanup::new(file, &path)).unwrap();
        assert_eq!(pool.pending_cleanups(), 1);
        assert!(pool.run_file_cleanup(fd));
        assert_eq!(pool.pending_cleanups(), 0);
        assert!(!pool.run_file_cleanup(fd));
        pool.destroy();
        assert!(path.exists());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn delete_file_cleanup_removes_file_on_destroy() {
        let path = std::env::temp_dir().join(format!("corral-delete-{}", std::process::id()));
        let file = std::fs::File::create(&path).unwrap();
        let fd = std::os::fd::AsRawFd::as_raw_fd(&file);
        let mut pool = pool();
        pool.add_delete_file_cleanup(FileCleanup::new(file, &path))
            .unwrap();
        // Keyed early release only matches close-file cleanups.
        assert!(!pool.run_file_cleanup(fd));
        pool.destroy();
        assert!(!path.exists());
    }

    #[test]
    fn pool_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Pool>();
    }

    #[test]
    fn memory_accounts_for_large_buffers() {
        let mut pool = pool();
        let base = pool.memory_bytes();
        let r = pool.alloc(100_000).unwrap();
        assert!(pool.memory_bytes() >= base + 100_000);
        assert!(pool.free(r).is_released());
        assert_eq!(pool.memory_bytes(), base);
    }

    proptest! {
        #[test]
        fn small_allocations_never_overlap(sizes in prop::collection::vec(1usize..600, 1..200)) {
            let mut pool = Pool::with_size(2048).unwrap();
            let mut spans: Vec<(usize, usize)> = Vec::new();
            let mut cursors: Vec<usize> = Vec::new();
            for size in sizes {
                let r = pool.alloc(size).unwrap();
                prop_assert!(!r.is_large());
                let start = pool.bytes(r).unwrap().as_ptr() as usize;
                spans.push((start, start + size));
                let now: Vec<usize> = pool.chain().iter().map(|(_, b)| b.cursor()).collect();
                for (before, after) in cursors.iter().zip(&now) {
                    prop_assert!(after >= before);
                }
                cursors = now;
            }
            spans.sort_unstable();
            for pair in spans.windows(2) {
                prop_assert!(pair[0].1 <= pair[1].0);
            }
        }

        #[test]
        fn routing_follows_threshold(size in 1usize..20_000) {
            let mut pool = pool();
            let r = pool.alloc(size).unwrap();
            prop_assert_eq!(r.is_large(), size > pool.max_small());
            prop_assert_eq!(pool.large_count(), usize::from(size > pool.max_small()));
        }
    }
}
