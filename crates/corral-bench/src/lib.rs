//! Workload generators for corral benchmarks.
//!
//! - [`request_workload`]: deterministic allocation sizes shaped like an
//!   HTTP request's lifetime, mostly small with a tail of large bodies.

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Largest size drawn for the small class.
pub const SMALL_MAX: usize = 256;
/// Largest size drawn for the medium class; still below the default
/// small-allocation threshold.
pub const MEDIUM_MAX: usize = 4000;
/// Largest size drawn for the large class.
pub const LARGE_MAX: usize = 64 * 1024;

/// Generate `n` allocation sizes from `seed`.
///
/// Roughly 85% are small (1..=256 bytes), 10% medium (257..=4000) and 5%
/// large (8 KiB..=64 KiB). The same seed always yields the same sizes.
pub fn request_workload(seed: u64, n: usize) -> Vec<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let class = rng.next_u32() % 100;
            let draw = rng.next_u32() as usize;
            match class {
                0..=84 => 1 + draw % SMALL_MAX,
                85..=94 => SMALL_MAX + 1 + draw % (MEDIUM_MAX - SMALL_MAX),
                _ => 8 * 1024 + draw % (LARGE_MAX - 8 * 1024 + 1),
            }
        })
        .collect()
}
