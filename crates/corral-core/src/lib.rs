//! Core types and traits for the corral pool allocator.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the fundamental abstractions used throughout the corral workspace:
//! typed ids, the error taxonomy, alignment helpers, and the
//! [`SystemAllocator`] seam through which every pool obtains memory.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod align;
pub mod error;
pub mod id;
pub mod system;

pub use align::{align_up, is_valid_alignment};
pub use error::{PoolError, Release};
pub use id::{BlockId, CleanupId, PoolId, SlotId};
pub use system::{Heap, SystemAllocator};
