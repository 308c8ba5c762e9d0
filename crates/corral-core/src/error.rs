//! Error types for pool operations.
//!
//! Allocation failures never poison a pool: a refused request leaves all
//! pool state unchanged and smaller follow-up requests may still succeed.

use thiserror::Error;

/// Errors that can occur during pool operations.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The system allocator refused a request.
    #[error("out of memory: system allocator refused {requested} bytes")]
    OutOfMemory {
        /// Number of bytes requested from the system allocator.
        requested: usize,
    },
    /// An alignment that is zero or not a power of two.
    #[error("invalid alignment {alignment}: must be a non-zero power of two")]
    InvalidAlignment {
        /// The rejected alignment.
        alignment: usize,
    },
    /// A pool configuration or container layout was rejected.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
    /// A region minted before the pool was last reset.
    #[error("stale region: generation {region_generation}, pool generation {pool_generation}")]
    StaleRegion {
        /// The generation encoded in the region.
        region_generation: u32,
        /// The pool's current generation.
        pool_generation: u32,
    },
    /// A region whose large allocation has already been freed.
    #[error("large allocation #{serial} has been released")]
    ReleasedRegion {
        /// Serial number of the released allocation.
        serial: u64,
    },
    /// A region minted by another pool, or one that does not lie inside any
    /// allocation of this pool.
    #[error("region does not belong to this pool")]
    ForeignRegion,
    /// A destination region shorter than the data copied into it.
    #[error("region too small: need {needed} bytes, have {available}")]
    RegionTooSmall {
        /// Bytes that had to fit.
        needed: usize,
        /// Length of the destination region.
        available: usize,
    },
}

/// Outcome of freeing a region.
///
/// Only large allocations can be released individually. Freeing anything
/// else is a normal, side-effect-free outcome rather than an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use]
pub enum Release {
    /// The region was a tracked large allocation and has been released.
    Released,
    /// The pool does not track the region individually; nothing happened.
    NotTracked,
}

impl Release {
    /// Whether the call released memory.
    pub fn is_released(self) -> bool {
        matches!(self, Self::Released)
    }
}
