/*!
 * Page Runs
 * Move-only handles to naturally aligned runs of physical pages
 */

use crate::core::limits::{PAGE_SHIFT, PAGE_SIZE};
use crate::core::types::{Order, Pfn, PhysAddr, Size};
use serde::{Deserialize, Serialize};

/// Which memory source a page comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    /// Directly addressable memory
    Low,
    /// Memory that needs a temporary mapping to be touched by the CPU
    High,
}

/// A run of `2^order` physically contiguous pages starting at `pfn`
///
/// Runs are neither `Clone` nor `Copy`: whoever holds the handle owns the
/// pages, so a run cannot be returned twice. Within the system heap a run
/// doubles as the segment descriptor of one allocation step.
#[derive(Debug, PartialEq, Eq)]
pub struct PageRun {
    pfn: Pfn,
    order: Order,
    tier: MemoryTier,
}

impl PageRun {
    /// Mint a handle. Only page sources should call this.
    pub fn new(pfn: Pfn, order: Order, tier: MemoryTier) -> Self {
        Self { pfn, order, tier }
    }

    #[inline]
    pub fn pfn(&self) -> Pfn {
        self.pfn
    }

    #[inline]
    pub fn order(&self) -> Order {
        self.order
    }

    #[inline]
    pub fn tier(&self) -> MemoryTier {
        self.tier
    }

    /// Number of base pages in the run
    #[inline]
    pub fn page_count(&self) -> usize {
        1 << self.order
    }

    /// Run length in bytes
    #[inline]
    pub fn len(&self) -> Size {
        order_to_size(self.order)
    }

    #[inline]
    pub fn phys_addr(&self) -> PhysAddr {
        pfn_to_phys(self.pfn)
    }

    /// Frame numbers covered by the run
    pub fn pfns(&self) -> std::ops::Range<Pfn> {
        self.pfn..self.pfn + self.page_count()
    }
}

/// Bytes in a run of the given order
#[inline]
pub const fn order_to_size(order: Order) -> Size {
    PAGE_SIZE << order
}

/// Round `size` up to a page boundary
#[inline]
pub const fn page_align(size: Size) -> Size {
    size.div_ceil(PAGE_SIZE) * PAGE_SIZE
}

/// Number of pages needed to hold `size` bytes
#[inline]
pub const fn size_to_pages(size: Size) -> usize {
    size.div_ceil(PAGE_SIZE)
}

/// Smallest order whose run covers `size` bytes
pub fn get_order(size: Size) -> Order {
    let pages = size_to_pages(size).max(1);
    pages.next_power_of_two().trailing_zeros()
}

#[inline]
pub const fn pfn_to_phys(pfn: Pfn) -> PhysAddr {
    (pfn as PhysAddr) << PAGE_SHIFT
}
