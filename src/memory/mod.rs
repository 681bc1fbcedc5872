/*!
 * Memory Module
 * Page runs, the page-source interface, and per-order page pools
 */

pub mod page;
pub mod physical;
pub mod pool;
pub mod source;

// Re-export for convenience
pub use page::{get_order, order_to_size, page_align, MemoryTier, PageRun};
pub use physical::{PhysicalMemory, PhysicalStats};
pub use pool::{LockedPagePool, LockedPoolFactory, PagePool, PoolFactory, PressureHint};
pub use source::{AllocPolicy, PageSource};
