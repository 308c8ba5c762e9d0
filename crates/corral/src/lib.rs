//! Corral: region-based memory pools for request-scoped allocation.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all corral sub-crates. For most users, adding `corral` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use corral::prelude::*;
//!
//! let mut pool = Pool::new(PoolConfig::default())?;
//!
//! // Small requests are bump-allocated; large ones are tracked individually.
//! let name = pool.alloc_unaligned(5)?;
//! pool.bytes_mut(name)?.copy_from_slice(b"hello");
//! let body = pool.alloc(64 * 1024)?;
//! assert!(pool.free(body).is_released());
//!
//! // Containers borrow the pool only while they grow.
//! let mut headers = Array::new(&mut pool, 4, 16)?;
//! headers.push(&mut pool)?;
//! let mut chunks = List::new(&mut pool, 8, 32)?;
//! chunks.push(&mut pool)?;
//!
//! // Cleanups run once, when the pool is dropped, never on reset.
//! let handle = pool.add_cleanup(0)?;
//! pool.set_cleanup(handle, CleanupAction::callback(|_| Ok(())));
//! pool.reset();
//! assert_eq!(pool.pending_cleanups(), 1);
//! pool.destroy();
//! # Ok::<(), PoolError>(())
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `corral-core` | Ids, errors, alignment helpers, system allocator seam |
//! | [`pool`] | `corral-pool` | Pool, configuration, regions, cleanups |
//! | [`collections`] | `corral-collections` | Growable array and chunked list |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, errors, and the system allocator seam (`corral-core`).
///
/// Implement [`types::SystemAllocator`] to control where pools get memory.
pub use corral_core as types;

/// The pool itself (`corral-pool`).
///
/// [`pool::Pool`] owns blocks, large allocations, and cleanups;
/// [`pool::Region`] is the handle every allocation returns.
pub use corral_pool as pool;

/// Pool-backed containers (`corral-collections`).
pub use corral_collections as collections;

/// Common imports for typical corral usage.
///
/// ```rust
/// use corral::prelude::*;
/// ```
pub mod prelude {
    // Pool
    pub use corral_pool::{
        CleanupAction, CleanupHandle, FileCleanup, Pool, PoolConfig, Region, RegionLocation,
    };

    // Errors and outcomes
    pub use corral_core::{PoolError, Release};

    // Memory source
    pub use corral_core::{Heap, SystemAllocator};

    // Containers
    pub use corral_collections::{Array, List};
}
