/*!
 * Core Types
 * Common types used across the heap
 */

/// Size type for memory operations (bytes)
pub type Size = usize;

/// Page-run order: a run of order `n` spans `2^n` base pages
pub type Order = u32;

/// Physical frame number of a base page
pub type Pfn = usize;

/// Physical byte address
pub type PhysAddr = u64;
