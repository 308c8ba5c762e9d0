//! Strongly-typed identifiers for pool internals.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static POOL_INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identity of one pool instance within the process.
///
/// Every region carries the id of the pool that minted it, so a pool can
/// refuse regions that came from any other pool even when their block,
/// slot and serial numbers happen to coincide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolId(u64);

impl PoolId {
    /// Allocate a fresh id. Never returns the same value twice.
    pub fn next() -> Self {
        Self(POOL_INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a block within a pool's block chain.
///
/// Blocks are appended in order and never removed before the pool is
/// destroyed, so `BlockId(n)` is the n-th block ever allocated by the pool.
/// `BlockId(0)` is the first block, which also carries the pool header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    /// The first block of every pool.
    pub const FIRST: Self = Self(0);

    /// Index into the block chain.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for BlockId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a large-allocation record within a pool.
///
/// Records are reused after their allocation is freed, so a slot id alone
/// does not identify an allocation; regions pair it with an allocation serial.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u32);

impl SlotId {
    /// Index into the record list.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SlotId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a registered cleanup action, in registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CleanupId(pub u32);

impl CleanupId {
    /// Index into the cleanup list.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CleanupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for CleanupId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}
