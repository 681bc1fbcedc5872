/*!
 * Physical Memory
 *
 * Host-side page source backed by a binary buddy allocator.
 *
 * ## Features
 *
 * - **Buddy allocation**: naturally aligned runs up to `MAX_PAGE_ORDER`, lowest frame first
 * - **Coalescing**: freed runs merge with their buddy while it is free
 * - **Split support**: an allocated run can be broken into single pages
 * - **Memory tiers**: frames at or above `high_tier_start` are high-tier
 * - **Sparse contents**: only written pages use host memory; untouched pages read as zero
 * - **Fault injection**: make allocations of a given order fail after N successes
 */

use super::page::{MemoryTier, PageRun};
use super::source::{AllocPolicy, PageSource};
use crate::core::limits::{MAX_PAGE_ORDER, PAGE_SIZE};
use crate::core::types::{Order, Pfn, Size};
use ahash::{HashMap, HashMapExt, RandomState};
use dashmap::DashMap;
use log::{debug, info, trace};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Allocation failure rule
#[derive(Debug, Clone)]
struct FaultRule {
    /// `None` matches every order
    order: Option<Order>,
    /// Matching allocations allowed to succeed before failures start
    remaining: usize,
}

impl FaultRule {
    /// Returns true when this allocation must fail
    fn check(&mut self, order: Order) -> bool {
        if self.order.is_some_and(|o| o != order) {
            return false;
        }
        if self.remaining > 0 {
            self.remaining -= 1;
            false
        } else {
            true
        }
    }
}

/// Buddy allocator state, guarded by one lock
#[derive(Debug)]
struct BuddyState {
    /// Free block start frames, one set per order
    free: Vec<BTreeSet<Pfn>>,
    /// Allocated runs: start frame -> order
    allocated: HashMap<Pfn, Order>,
    fault: Option<FaultRule>,
}

impl BuddyState {
    fn new(total_pages: usize) -> Self {
        let mut free = vec![BTreeSet::new(); MAX_PAGE_ORDER as usize + 1];

        // Carve the frame range into the largest aligned blocks that fit
        let mut pfn = 0;
        while pfn < total_pages {
            let mut order = MAX_PAGE_ORDER;
            while order > 0 && (pfn % (1 << order) != 0 || pfn + (1 << order) > total_pages) {
                order -= 1;
            }
            free[order as usize].insert(pfn);
            pfn += 1 << order;
        }

        Self {
            free,
            allocated: HashMap::new(),
            fault: None,
        }
    }

    fn alloc(&mut self, order: Order) -> Option<Pfn> {
        let found = (order..=MAX_PAGE_ORDER).find(|&o| !self.free[o as usize].is_empty())?;
        let pfn = self.free[found as usize].pop_first()?;

        // Hand the upper halves back until the block has the requested order
        let mut current = found;
        while current > order {
            current -= 1;
            self.free[current as usize].insert(pfn + (1 << current));
        }

        self.allocated.insert(pfn, order);
        Some(pfn)
    }

    fn release(&mut self, pfn: Pfn, order: Order, total_pages: usize) {
        match self.allocated.remove(&pfn) {
            Some(held) if held == order => {}
            Some(held) => panic!(
                "page run at pfn {} freed with order {} but was allocated with order {}",
                pfn, order, held
            ),
            None => panic!("page run at pfn {} (order {}) freed while not allocated", pfn, order),
        }

        let mut pfn = pfn;
        let mut order = order;
        while order < MAX_PAGE_ORDER {
            let buddy = pfn ^ (1 << order);
            if buddy + (1 << order) > total_pages || !self.free[order as usize].remove(&buddy) {
                break;
            }
            pfn = pfn.min(buddy);
            order += 1;
        }
        self.free[order as usize].insert(pfn);
    }

    fn split(&mut self, pfn: Pfn, order: Order) {
        match self.allocated.remove(&pfn) {
            Some(held) if held == order => {}
            _ => panic!("split of page run at pfn {} (order {}) that is not allocated", pfn, order),
        }
        for page in pfn..pfn + (1 << order) {
            self.allocated.insert(page, 0);
        }
    }

    fn is_allocated(&self, pfn: Pfn) -> bool {
        self.allocated
            .iter()
            .any(|(&start, &order)| pfn >= start && pfn < start + (1 << order))
    }
}

/// Physical memory statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalStats {
    pub total_pages: usize,
    pub allocated_pages: usize,
    pub free_pages: usize,
    pub high_order_allocs: usize,
    pub low_order_allocs: usize,
    pub failed_allocs: usize,
    pub frees: usize,
}

/// Buddy-allocated physical memory for host builds and tests
pub struct PhysicalMemory {
    total_pages: usize,
    high_tier_start: Pfn,
    state: Mutex<BuddyState>,
    // Only pages with non-zero contents have an entry
    contents: DashMap<Pfn, Box<[u8]>, RandomState>,
    allocated_pages: AtomicUsize,
    high_order_allocs: AtomicUsize,
    low_order_allocs: AtomicUsize,
    failed_allocs: AtomicUsize,
    frees: AtomicUsize,
}

impl PhysicalMemory {
    /// Memory of `total_pages` low-tier pages
    pub fn new(total_pages: usize) -> Self {
        Self::with_high_tier(total_pages, total_pages)
    }

    /// Memory where frames at or above `high_tier_start` are high-tier
    pub fn with_high_tier(total_pages: usize, high_tier_start: Pfn) -> Self {
        info!(
            "Physical memory initialized with {} pages ({} bytes), high tier from pfn {}",
            total_pages,
            total_pages * PAGE_SIZE,
            high_tier_start
        );
        Self {
            total_pages,
            high_tier_start,
            state: Mutex::new(BuddyState::new(total_pages)),
            contents: DashMap::with_hasher(RandomState::new()),
            allocated_pages: AtomicUsize::new(0),
            high_order_allocs: AtomicUsize::new(0),
            low_order_allocs: AtomicUsize::new(0),
            failed_allocs: AtomicUsize::new(0),
            frees: AtomicUsize::new(0),
        }
    }

    fn tier_of(&self, pfn: Pfn) -> MemoryTier {
        if pfn >= self.high_tier_start {
            MemoryTier::High
        } else {
            MemoryTier::Low
        }
    }

    /// Fail allocations of `order` (or any order) once `after` of them succeeded
    pub fn fail_allocations(&self, order: Option<Order>, after: usize) {
        debug!("Injecting allocation faults: order {:?} after {} successes", order, after);
        self.state.lock().fault = Some(FaultRule {
            order,
            remaining: after,
        });
    }

    pub fn clear_faults(&self) {
        self.state.lock().fault = None;
    }

    /// Pages currently handed out
    pub fn allocated_pages(&self) -> usize {
        self.allocated_pages.load(Ordering::SeqCst)
    }

    pub fn free_page_count(&self) -> usize {
        self.total_pages - self.allocated_pages()
    }

    pub fn is_allocated(&self, pfn: Pfn) -> bool {
        self.state.lock().is_allocated(pfn)
    }

    /// Write `data` into page `pfn` at `offset`. The page must be allocated.
    pub fn write(&self, pfn: Pfn, offset: Size, data: &[u8]) {
        assert!(
            offset + data.len() <= PAGE_SIZE,
            "write of {} bytes at offset {} crosses the page boundary",
            data.len(),
            offset
        );
        assert!(self.is_allocated(pfn), "write to unallocated pfn {}", pfn);

        let mut page = self
            .contents
            .entry(pfn)
            .or_insert_with(|| vec![0u8; PAGE_SIZE].into_boxed_slice());
        page[offset..offset + data.len()].copy_from_slice(data);
    }

    /// Contents of page `pfn`
    pub fn read(&self, pfn: Pfn) -> Vec<u8> {
        self.contents
            .get(&pfn)
            .map(|page| page.to_vec())
            .unwrap_or_else(|| vec![0u8; PAGE_SIZE])
    }

    pub fn is_zeroed(&self, pfn: Pfn) -> bool {
        self.contents
            .get(&pfn)
            .map_or(true, |page| page.iter().all(|&b| b == 0))
    }

    pub fn stats(&self) -> PhysicalStats {
        let allocated = self.allocated_pages();
        PhysicalStats {
            total_pages: self.total_pages,
            allocated_pages: allocated,
            free_pages: self.total_pages - allocated,
            high_order_allocs: self.high_order_allocs.load(Ordering::SeqCst),
            low_order_allocs: self.low_order_allocs.load(Ordering::SeqCst),
            failed_allocs: self.failed_allocs.load(Ordering::SeqCst),
            frees: self.frees.load(Ordering::SeqCst),
        }
    }

    fn clear_contents(&self, run: &PageRun) {
        for pfn in run.pfns() {
            self.contents.remove(&pfn);
        }
    }
}

impl PageSource for PhysicalMemory {
    fn alloc_pages(&self, policy: AllocPolicy, order: Order) -> Option<PageRun> {
        match policy {
            AllocPolicy::HighOrder => self.high_order_allocs.fetch_add(1, Ordering::SeqCst),
            AllocPolicy::LowOrder => self.low_order_allocs.fetch_add(1, Ordering::SeqCst),
        };

        let pfn = {
            let mut state = self.state.lock();
            let faulted = state.fault.as_mut().is_some_and(|rule| rule.check(order));
            if faulted || order > MAX_PAGE_ORDER {
                None
            } else {
                state.alloc(order)
            }
        };

        match pfn {
            Some(pfn) => {
                self.allocated_pages.fetch_add(1 << order, Ordering::SeqCst);
                trace!("Allocated order {} run at pfn {} ({:?})", order, pfn, policy);
                Some(PageRun::new(pfn, order, self.tier_of(pfn)))
            }
            None => {
                self.failed_allocs.fetch_add(1, Ordering::SeqCst);
                if policy.may_block() {
                    debug!("Page allocation of order {} failed ({:?})", order, policy);
                }
                None
            }
        }
    }

    fn free_pages(&self, run: PageRun) {
        // Freed memory reads as zero on its next allocation
        self.clear_contents(&run);
        self.state
            .lock()
            .release(run.pfn(), run.order(), self.total_pages);
        self.allocated_pages
            .fetch_sub(run.page_count(), Ordering::SeqCst);
        self.frees.fetch_add(1, Ordering::SeqCst);
        trace!("Freed order {} run at pfn {}", run.order(), run.pfn());
    }

    fn split_page(&self, run: PageRun) -> Vec<PageRun> {
        self.state.lock().split(run.pfn(), run.order());
        run.pfns()
            .map(|pfn| PageRun::new(pfn, 0, self.tier_of(pfn)))
            .collect()
    }

    fn zero_pages(&self, run: &PageRun) {
        self.clear_contents(run);
    }

    fn total_pages(&self) -> usize {
        self.total_pages
    }
}
