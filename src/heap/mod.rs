/*!
 * Heaps
 *
 * Buffer allocators for device drivers.
 *
 * - [`SystemHeap`]: scatter-gather buffers assembled from pooled power-of-two runs
 * - [`ContiguousHeap`]: one physically contiguous run, trimmed to the requested length
 *
 * Both implement [`Heap`], the capability surface used by the buffer
 * lifecycle layer above them.
 */

pub mod bank;
pub mod buffer;
pub mod config;
pub mod contig;
pub mod system;

pub use bank::PoolBank;
pub use buffer::{HeapBuffer, SgEntry, SgTable};
pub use config::{SizeClasses, SystemHeapConfig};
pub use contig::ContiguousHeap;
pub use system::{HeapDebugReport, PoolUsage, ShrinkOutcome, SystemHeap};

use crate::core::errors::{HeapError, HeapResult};
use crate::core::types::{PhysAddr, Size};
use crate::memory::PressureHint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// CPU cache attribute of a buffer's mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cacheability {
    Cached,
    Uncached,
}

impl Cacheability {
    #[inline]
    pub fn is_cached(self) -> bool {
        matches!(self, Cacheability::Cached)
    }
}

impl fmt::Display for Cacheability {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Cacheability::Cached => f.pad("cached"),
            Cacheability::Uncached => f.pad("uncached"),
        }
    }
}

/// Who is releasing a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreeOrigin {
    /// Released by its owner; pages go back to the pools
    Normal,
    /// Released while answering a memory-pressure reclaim on the same heap;
    /// pages bypass the pools and go straight back to the page source
    ReclaimDriven,
}

/// Heap variant identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeapType {
    System,
    SystemContig,
}

impl fmt::Display for HeapType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HeapType::System => f.pad("system"),
            HeapType::SystemContig => f.pad("system-contig"),
        }
    }
}

/// Allocation capability shared by every heap variant
pub trait Heap: Send + Sync {
    fn name(&self) -> &str;

    fn heap_type(&self) -> HeapType;

    /// Whether the lifecycle layer may queue freed buffers and release them
    /// later, with [`FreeOrigin::ReclaimDriven`] when done under pressure
    fn defers_free(&self) -> bool {
        false
    }

    /// Allocate a buffer of at least `size` bytes
    fn allocate(
        &self,
        size: Size,
        align: Size,
        cacheability: Cacheability,
    ) -> HeapResult<HeapBuffer>;

    /// Release a buffer allocated by this heap
    fn free(&self, buffer: HeapBuffer, origin: FreeOrigin);

    /// Device view of a buffer. Heap buffers are already device-consumable.
    fn map_dma<'a>(&self, buffer: &'a HeapBuffer) -> &'a SgTable {
        buffer.sg_table()
    }

    fn unmap_dma(&self, _buffer: &HeapBuffer) {}

    /// Physical address and length of a physically contiguous buffer
    fn phys(&self, _buffer: &HeapBuffer) -> HeapResult<(PhysAddr, Size)> {
        Err(HeapError::invalid_argument(format!(
            "{} heap buffers are not physically contiguous",
            self.heap_type()
        )))
    }

    /// Answer a memory-pressure request; returns pages still resident
    fn shrink(&self, _hint: PressureHint, _nr_to_scan: usize) -> usize {
        0
    }

    fn debug_report(&self) -> Option<HeapDebugReport> {
        None
    }
}
