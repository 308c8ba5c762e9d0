//! Region-based memory pools for request-scoped allocation.
//!
//! A pool hands out many small allocations cheaply by bumping a cursor
//! through fixed-size blocks, serves oversized requests from individually
//! tracked system buffers, and releases everything at once. Deferred
//! cleanup actions (closures, file closes, file deletes) run when the pool
//! is destroyed.
//!
//! # Architecture
//!
//! ```text
//! Pool (owner)
//! ├── BlockChain → Block[] (bump cursor + failure counter each)
//! │   └── current: first block small allocations try
//! ├── LargeList → LargeRecord[] (system buffer or tombstone)
//! ├── CleanupList → CleanupEntry[] (run head first on drop)
//! └── Box<dyn SystemAllocator> (where all memory comes from)
//! ```
//!
//! # Regions
//!
//! Allocations are addressed by [`Region`] handles rather than raw
//! pointers. A region records the pool and the generation it was minted
//! in; after [`Pool::reset`] every older region fails to resolve with
//! [`PoolError::StaleRegion`] instead of aliasing new data, and a region
//! shown to any other pool fails with [`PoolError::ForeignRegion`].
//!
//! # Lifecycle
//!
//! - **Allocate:** [`Pool::alloc`], [`Pool::alloc_unaligned`],
//!   [`Pool::alloc_zeroed`], [`Pool::alloc_aligned`].
//! - **Release early:** [`Pool::free`], large allocations only.
//! - **Reuse:** [`Pool::reset`] keeps blocks and cleanups.
//! - **Tear down:** drop the pool or call [`Pool::destroy`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod block;
pub mod cleanup;
pub mod config;
pub mod handle;
pub(crate) mod large;
pub mod pool;

// Public re-exports for the primary API surface.
pub use block::BlockStats;
pub use cleanup::{CleanupAction, CleanupFn, CleanupHandle, FileCleanup};
pub use config::PoolConfig;
pub use corral_core::{PoolError, Release};
pub use handle::{Region, RegionLocation};
pub use pool::Pool;
