//! Pool configuration parameters.

use corral_core::{align_up, PoolError};

/// Configuration for a [`Pool`](crate::Pool).
///
/// Controls block sizing and the small/large routing threshold.
/// Validated at construction; all values are immutable after creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Size of every block in bytes, including its header.
    ///
    /// Default: 16 KiB. Must be at least [`PoolConfig::MIN_POOL_SIZE`].
    pub size: usize,

    /// System page size in bytes.
    ///
    /// Caps the small-allocation threshold at `page_size - 1`.
    /// Default: 4096. Must be a power of two.
    pub page_size: usize,

    /// Route every request through the large path.
    ///
    /// Each allocation then gets its own system buffer, which makes
    /// overruns visible to external memory checkers. Default: `false`.
    pub force_large: bool,
}

impl PoolConfig {
    /// Default block size: 16 KiB.
    pub const DEFAULT_POOL_SIZE: usize = 16 * 1024;

    /// Default page size.
    pub const DEFAULT_PAGE_SIZE: usize = 4096;

    /// Alignment of every block's base address.
    pub const POOL_ALIGNMENT: usize = 16;

    /// Alignment applied to aligned bump allocations (one machine word).
    pub const ALIGNMENT: usize = std::mem::size_of::<usize>();

    /// Bytes reserved at the start of the first block for the pool header.
    pub const POOL_HEADER_SIZE: usize = 80;

    /// Bytes reserved at the start of every later block for its link header.
    pub const BLOCK_HEADER_SIZE: usize = 32;

    /// Bump space consumed by one large-allocation record.
    pub const LARGE_RECORD_SIZE: usize = 16;

    /// Bump space consumed by one cleanup record.
    pub const CLEANUP_RECORD_SIZE: usize = 24;

    /// Smallest accepted block size: the header plus two large records,
    /// rounded up to the pool alignment.
    pub const MIN_POOL_SIZE: usize =
        (Self::POOL_HEADER_SIZE + 2 * Self::LARGE_RECORD_SIZE + Self::POOL_ALIGNMENT - 1)
            & !(Self::POOL_ALIGNMENT - 1);

    /// A block whose failure counter exceeds this is skipped by later
    /// small allocations.
    pub const FAIL_SKIP_THRESHOLD: u32 = 4;

    /// How many large records are probed for reuse before a new one is made.
    pub const LARGE_REUSE_PROBES: usize = 4;

    /// Create a config for blocks of `size` bytes with default page size.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            page_size: Self::DEFAULT_PAGE_SIZE,
            force_large: false,
        }
    }

    /// Largest request served by bump allocation.
    ///
    /// `min(size - POOL_HEADER_SIZE, page_size - 1)`.
    pub fn max_small(&self) -> usize {
        self.size
            .saturating_sub(Self::POOL_HEADER_SIZE)
            .min(self.page_size.saturating_sub(1))
    }

    /// Check the configuration, returning the first problem found.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.size < Self::MIN_POOL_SIZE {
            return Err(PoolError::InvalidConfig {
                reason: format!(
                    "size must be >= {} bytes (got {})",
                    Self::MIN_POOL_SIZE,
                    self.size,
                ),
            });
        }
        if !self.page_size.is_power_of_two() {
            return Err(PoolError::InvalidConfig {
                reason: format!(
                    "page_size must be a power of two (got {})",
                    self.page_size,
                ),
            });
        }
        if align_up(self.size, Self::POOL_ALIGNMENT).is_none() {
            return Err(PoolError::InvalidConfig {
                reason: format!("size {} overflows when aligned", self.size),
            });
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_POOL_SIZE)
    }
}
