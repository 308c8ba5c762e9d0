//! Test utilities and mock types for corral development.
//!
//! Provides mock implementations of [`SystemAllocator`] that count or
//! refuse requests, a [`CleanupRecorder`] for asserting cleanup order,
//! and [`init_tracing`] for tests that want pool diagnostics on stderr.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use corral_core::{Heap, PoolError, SystemAllocator};
use tracing_subscriber::{fmt, EnvFilter};

pub use fixtures::{request_sizes, CleanupRecorder};

/// Install a stderr subscriber filtered by `RUST_LOG`, defaulting to `warn`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Heap-backed allocator that counts every request.
///
/// Clones share their counters, so a test can keep one clone and hand the
/// other to a pool.
#[derive(Clone, Debug, Default)]
pub struct CountingAllocator {
    calls: Arc<AtomicUsize>,
    bytes: Arc<AtomicUsize>,
}

impl CountingAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful allocations so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Total bytes handed out so far.
    pub fn bytes(&self) -> usize {
        self.bytes.load(Ordering::Relaxed)
    }
}

impl SystemAllocator for CountingAllocator {
    fn allocate(&self, size: usize) -> Result<Vec<u8>, PoolError> {
        let storage = Heap::alloc(size)?;
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(size, Ordering::Relaxed);
        Ok(storage)
    }
}

/// Allocator that refuses requests deterministically.
///
/// Fails every request after `succeed_count` successful ones, and every
/// request above `max_size` regardless of the count.
#[derive(Clone, Debug)]
pub struct FailingAllocator {
    pub succeed_count: usize,
    pub max_size: usize,
    calls: Arc<AtomicUsize>,
}

impl FailingAllocator {
    /// Succeed `succeed_count` times, then fail.
    pub fn after(succeed_count: usize) -> Self {
        Self {
            succeed_count,
            max_size: usize::MAX,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail any request larger than `max_size` bytes.
    pub fn above(max_size: usize) -> Self {
        Self {
            succeed_count: usize::MAX,
            max_size,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Allow `extra` more successful allocations.
    pub fn allow(&self, extra: usize) {
        let calls = self.calls.load(Ordering::Relaxed);
        self.calls.store(calls.saturating_sub(extra), Ordering::Relaxed);
    }

    /// How many requests succeeded so far, net of [`allow`](Self::allow).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl SystemAllocator for FailingAllocator {
    fn allocate(&self, size: usize) -> Result<Vec<u8>, PoolError> {
        if size > self.max_size || self.calls.load(Ordering::Relaxed) >= self.succeed_count {
            return Err(PoolError::OutOfMemory { requested: size });
        }
        self.calls.fetch_add(1, Ordering::Relaxed);
        Heap::alloc(size)
    }
}
