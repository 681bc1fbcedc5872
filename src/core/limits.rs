/*!
 * System Limits and Constants
 *
 * Centralized location for page geometry, size-class defaults, and thresholds.
 *
 * ## Design Philosophy
 * - Values are grouped by domain (pages, heap, diagnostics)
 * - Performance-critical constants are marked with [PERF]
 * - Linux-compatible values are marked with [LINUX-COMPAT]
 */

use super::types::{Order, Size};
use std::time::Duration;

// =============================================================================
// PAGE GEOMETRY
// =============================================================================

/// log2 of the base page size
/// [LINUX-COMPAT] 4KB pages
pub const PAGE_SHIFT: u32 = 12;

/// Base page size in bytes
pub const PAGE_SIZE: Size = 1 << PAGE_SHIFT;

/// Largest run order the page source hands out
/// [LINUX-COMPAT] MAX_ORDER - 1 on a default buddy allocator (4MB runs)
pub const MAX_PAGE_ORDER: Order = 10;

// =============================================================================
// SYSTEM HEAP
// =============================================================================

/// Default size classes, largest first
/// 1MB and 64KB runs keep TLB and IOMMU pressure low; order 0 guarantees progress
/// [PERF] Larger classes cut scatter-list length for big buffers
pub const DEFAULT_SIZE_CLASS_ORDERS: [Order; 3] = [8, 4, 0];

/// A single allocation may claim at most `1 / MAX_ALLOCATION_DIVISOR` of all pages
pub const MAX_ALLOCATION_DIVISOR: usize = 2;

/// Default heap names reported in logs and diagnostics
pub const DEFAULT_SYSTEM_HEAP_NAME: &str = "system";
pub const DEFAULT_CONTIG_HEAP_NAME: &str = "system-contig";

// =============================================================================
// SIMULATED PHYSICAL MEMORY
// =============================================================================

/// Pages managed by the host-side page source when none is configured (256MB)
pub const DEFAULT_PHYSICAL_PAGES: usize = 64 * 1024;

// =============================================================================
// DIAGNOSTICS
// =============================================================================

/// Heap operations slower than this are logged at warn level
pub const SLOW_HEAP_OP_THRESHOLD: Duration = Duration::from_millis(10);
