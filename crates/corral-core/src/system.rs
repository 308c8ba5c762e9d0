//! The seam between pools and the system allocator.
//!
//! Pools never call the global allocator for their block or large storage
//! directly. They go through a [`SystemAllocator`], which turns allocation
//! refusal into [`PoolError::OutOfMemory`] instead of aborting the process.

use std::fmt;

use crate::error::PoolError;

/// Source of raw, zero-initialised byte buffers.
///
/// Implementations must either return a buffer of exactly `size` bytes or
/// an error; partial buffers are not allowed. The returned `Vec` must not
/// be resized by the caller, so its storage address is stable.
pub trait SystemAllocator: Send + fmt::Debug {
    /// Allocate `size` zeroed bytes.
    fn allocate(&self, size: usize) -> Result<Vec<u8>, PoolError>;
}

/// Default allocator backed by the global heap.
///
/// Uses [`Vec::try_reserve_exact`], so an unsatisfiable request returns
/// [`PoolError::OutOfMemory`] rather than aborting.
#[derive(Clone, Copy, Debug, Default)]
pub struct Heap;

impl Heap {
    /// Allocate `size` bytes from the heap.
    ///
    /// Stand-alone helper for callers that need memory outside any pool.
    pub fn alloc(size: usize) -> Result<Vec<u8>, PoolError> {
        let mut buf = Vec::new();
        if buf.try_reserve_exact(size).is_err() {
            tracing::warn!(size, "heap allocation refused");
            return Err(PoolError::OutOfMemory { requested: size });
        }
        buf.resize(size, 0);
        tracing::trace!(size, ptr = ?buf.as_ptr(), "malloc");
        Ok(buf)
    }

    /// Allocate `size` bytes from the heap, guaranteed zero-filled.
    pub fn alloc_zeroed(size: usize) -> Result<Vec<u8>, PoolError> {
        Self::alloc(size)
    }
}

impl SystemAllocator for Heap {
    fn allocate(&self, size: usize) -> Result<Vec<u8>, PoolError> {
        Self::alloc(size)
    }
}
