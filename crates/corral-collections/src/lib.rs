//! Growable containers allocated from a [`Pool`](corral_pool::Pool).
//!
//! Both containers are plain tokens: they hold regions and counters, and
//! every mutating call takes the owning pool explicitly. Many containers
//! can therefore share one pool without borrowing it for their lifetime.
//!
//! - [`Array`]: contiguous storage. Grows in place while it is the most
//!   recent allocation in the pool's current block, otherwise by copying into a buffer of
//!   twice the capacity. Element regions are invalidated by a copy.
//! - [`List`]: a chain of fixed-capacity parts. Never copies, so element
//!   regions stay valid for the list's whole lifetime.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod array;
pub mod list;

pub use array::Array;
pub use list::{List, Part};

use corral_core::PoolError;

/// Bytes needed for `count` elements of `elem_size` bytes.
pub(crate) fn byte_size(count: usize, elem_size: usize) -> Result<usize, PoolError> {
    count
        .checked_mul(elem_size)
        .ok_or(PoolError::OutOfMemory {
            requested: usize::MAX,
        })
}

/// Reject layouts that could never hold an element.
pub(crate) fn check_layout(capacity: usize, elem_size: usize) -> Result<(), PoolError> {
    if capacity == 0 {
        return Err(PoolError::InvalidConfig {
            reason: "capacity must be at least one element".to_string(),
        });
    }
    if elem_size == 0 {
        return Err(PoolError::InvalidConfig {
            reason: "element size must be non-zero".to_string(),
        });
    }
    Ok(())
}
