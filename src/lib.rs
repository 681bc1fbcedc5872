/*!
 * System Heap
 *
 * Device-buffer allocators: a pooled scatter-gather heap that builds buffers
 * from power-of-two page runs, and a physically contiguous heap for devices
 * without scatter-gather support.
 */

pub mod core;
pub mod heap;
pub mod memory;
pub mod monitoring;

// Re-exports
pub use crate::core::errors::{HeapError, HeapResult};
pub use heap::{
    Cacheability, ContiguousHeap, FreeOrigin, Heap, HeapBuffer, HeapDebugReport, HeapType,
    SgEntry, SgTable, ShrinkOutcome, SizeClasses, SystemHeap, SystemHeapConfig,
};
pub use memory::{
    AllocPolicy, LockedPagePool, LockedPoolFactory, MemoryTier, PagePool, PageRun, PageSource,
    PhysicalMemory, PoolFactory, PressureHint,
};
pub use monitoring::init_tracing;
