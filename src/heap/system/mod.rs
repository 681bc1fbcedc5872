/*!
 * System Heap
 *
 * Scatter-gather buffers assembled from pooled power-of-two page runs.
 *
 * ## Allocation
 *
 * Largest-available-first: each step takes the biggest size class that fits
 * the remaining bytes and is no larger than the previous step's run. Freed
 * runs return to per-order pools, one bank per cacheability attribute, so the
 * next buffer of the same kind skips the page source entirely.
 *
 * ## Reclaim
 *
 * Pools are drained by [`SystemHeap::shrink`] under memory pressure. Buffers
 * released while answering that pressure use [`FreeOrigin::ReclaimDriven`]
 * and bypass the pools.
 */

mod allocator;
mod debug;
mod shrink;

pub use debug::{HeapDebugReport, PoolUsage};
pub use shrink::ShrinkOutcome;

use super::bank::PoolBank;
use super::buffer::HeapBuffer;
use super::config::{SizeClasses, SystemHeapConfig};
use super::{Cacheability, FreeOrigin, Heap, HeapType};
use crate::core::errors::HeapResult;
use crate::core::types::Size;
use crate::memory::{LockedPoolFactory, PageSource, PoolFactory, PressureHint};
use log::info;
use std::sync::Arc;

/// Pooled scatter-gather heap
///
/// Field order is teardown order: the uncached bank is destroyed before the
/// cached bank.
pub struct SystemHeap<F: PoolFactory = LockedPoolFactory> {
    config: SystemHeapConfig,
    source: Arc<dyn PageSource>,
    uncached: PoolBank<F::Pool>,
    cached: PoolBank<F::Pool>,
}

impl SystemHeap<LockedPoolFactory> {
    /// Heap with mutex-protected pools over `source`
    pub fn with_source(source: Arc<dyn PageSource>, config: SystemHeapConfig) -> HeapResult<Self> {
        Self::new(config, &LockedPoolFactory::new(source))
    }
}

impl<F: PoolFactory> SystemHeap<F> {
    /// Build both pool banks, uncached first
    ///
    /// If the cached bank cannot be built, the uncached bank is dropped
    /// before the error is returned.
    pub fn new(config: SystemHeapConfig, factory: &F) -> HeapResult<Self> {
        let uncached = PoolBank::create(factory, &config.size_classes, Cacheability::Uncached)?;
        let cached = PoolBank::create(factory, &config.size_classes, Cacheability::Cached)?;

        info!(
            "System heap '{}' initialized with size classes {:?}",
            config.name,
            config.size_classes.orders()
        );

        Ok(Self {
            source: Arc::clone(factory.source()),
            config,
            uncached,
            cached,
        })
    }

    pub fn config(&self) -> &SystemHeapConfig {
        &self.config
    }

    pub fn size_classes(&self) -> &SizeClasses {
        &self.config.size_classes
    }

    /// Pool bank backing buffers of the given cacheability
    #[inline]
    pub fn bank(&self, cacheability: Cacheability) -> &PoolBank<F::Pool> {
        match cacheability {
            Cacheability::Cached => &self.cached,
            Cacheability::Uncached => &self.uncached,
        }
    }
}

impl<F: PoolFactory> Heap for SystemHeap<F> {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn heap_type(&self) -> HeapType {
        HeapType::System
    }

    fn defers_free(&self) -> bool {
        true
    }

    fn allocate(
        &self,
        size: Size,
        align: Size,
        cacheability: Cacheability,
    ) -> HeapResult<HeapBuffer> {
        SystemHeap::allocate(self, size, align, cacheability)
    }

    fn free(&self, buffer: HeapBuffer, origin: FreeOrigin) {
        SystemHeap::free(self, buffer, origin)
    }

    fn shrink(&self, hint: PressureHint, nr_to_scan: usize) -> usize {
        SystemHeap::shrink(self, hint, nr_to_scan)
    }

    fn debug_report(&self) -> Option<HeapDebugReport> {
        Some(SystemHeap::debug_report(self))
    }
}

impl<F: PoolFactory> Drop for SystemHeap<F> {
    fn drop(&mut self) {
        info!("Destroying system heap '{}'", self.config.name);
    }
}
