/*!
 * Page Pools
 *
 * Per-order caches of free page runs sitting between a heap and its page source.
 *
 * A pool keeps two lists, one per memory tier. Allocation prefers high-tier
 * pages, reclaim drains low-tier pages first. Every list mutation happens
 * under the pool's own lock; the lock is never held across a page-source call.
 */

use super::page::{MemoryTier, PageRun};
use super::source::{AllocPolicy, PageSource};
use crate::core::types::Order;
use log::{debug, trace};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Allocation context of a memory-pressure reclaim request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PressureHint {
    /// Whether high-tier pages may be released (and are counted)
    pub reclaim_high_tier: bool,
}

impl PressureHint {
    pub const ALL: PressureHint = PressureHint {
        reclaim_high_tier: true,
    };

    pub const LOW_TIER_ONLY: PressureHint = PressureHint {
        reclaim_high_tier: false,
    };
}

impl Default for PressureHint {
    fn default() -> Self {
        Self::ALL
    }
}

/// Free-page cache for a single order
pub trait PagePool: Send + Sync {
    fn order(&self) -> Order;

    /// Take a cached run, or a fresh one from the page source
    fn alloc(&self) -> Option<PageRun>;

    /// Cache a run for reuse
    fn free(&self, run: PageRun);

    /// Release cached runs to the page source
    ///
    /// With `nr_to_scan == 0` nothing is released and the number of
    /// reclaimable base pages is returned. Otherwise runs are released until
    /// at least `nr_to_scan` base pages were freed or nothing eligible is
    /// left, and the number of base pages freed is returned.
    fn shrink(&self, hint: PressureHint, nr_to_scan: usize) -> usize;

    /// Cached high-tier runs
    fn high_count(&self) -> usize;

    /// Cached low-tier runs
    fn low_count(&self) -> usize;

    /// Cached base pages across both tiers
    fn resident_pages(&self) -> usize {
        (self.high_count() + self.low_count()) << self.order()
    }
}

/// Creates pools bound to one page source
pub trait PoolFactory: Send + Sync {
    type Pool: PagePool;

    /// Create a pool, or `None` if it cannot be set up
    fn create(&self, policy: AllocPolicy, order: Order) -> Option<Self::Pool>;

    /// Page source backing every pool this factory creates
    fn source(&self) -> &Arc<dyn PageSource>;
}

#[derive(Debug, Default)]
struct PoolLists {
    high: Vec<PageRun>,
    low: Vec<PageRun>,
}

/// Mutex-protected page pool
pub struct LockedPagePool {
    order: Order,
    policy: AllocPolicy,
    source: Arc<dyn PageSource>,
    lists: Mutex<PoolLists>,
}

impl LockedPagePool {
    pub fn new(source: Arc<dyn PageSource>, policy: AllocPolicy, order: Order) -> Self {
        Self {
            order,
            policy,
            source,
            lists: Mutex::new(PoolLists::default()),
        }
    }

    pub fn policy(&self) -> AllocPolicy {
        self.policy
    }

    /// Pop one reclaimable run, low tier first
    fn take_for_reclaim(&self, hint: PressureHint) -> Option<PageRun> {
        let mut lists = self.lists.lock();
        match lists.low.pop() {
            Some(run) => Some(run),
            None if hint.reclaim_high_tier => lists.high.pop(),
            None => None,
        }
    }

    fn reclaimable_pages(&self, hint: PressureHint) -> usize {
        let lists = self.lists.lock();
        let runs = if hint.reclaim_high_tier {
            lists.high.len() + lists.low.len()
        } else {
            lists.low.len()
        };
        runs << self.order
    }
}

impl PagePool for LockedPagePool {
    fn order(&self) -> Order {
        self.order
    }

    fn alloc(&self) -> Option<PageRun> {
        let cached = {
            let mut lists = self.lists.lock();
            lists.high.pop().or_else(|| lists.low.pop())
        };

        match cached {
            Some(run) => {
                trace!("Order {} pool reused run at pfn {}", self.order, run.pfn());
                Some(run)
            }
            None => self.source.alloc_pages(self.policy, self.order),
        }
    }

    fn free(&self, run: PageRun) {
        assert_eq!(
            run.order(),
            self.order,
            "order {} run returned to order {} pool",
            run.order(),
            self.order
        );

        let mut lists = self.lists.lock();
        match run.tier() {
            MemoryTier::High => lists.high.push(run),
            MemoryTier::Low => lists.low.push(run),
        }
    }

    fn shrink(&self, hint: PressureHint, nr_to_scan: usize) -> usize {
        if nr_to_scan == 0 {
            return self.reclaimable_pages(hint);
        }

        let mut freed = 0;
        while freed < nr_to_scan {
            let Some(run) = self.take_for_reclaim(hint) else {
                break;
            };
            freed += run.page_count();
            self.source.free_pages(run);
        }

        if freed > 0 {
            debug!(
                "Order {} pool released {} pages (asked for {})",
                self.order, freed, nr_to_scan
            );
        }
        freed
    }

    fn high_count(&self) -> usize {
        self.lists.lock().high.len()
    }

    fn low_count(&self) -> usize {
        self.lists.lock().low.len()
    }
}

impl Drop for LockedPagePool {
    fn drop(&mut self) {
        let lists = std::mem::take(self.lists.get_mut());
        let released = lists.high.len() + lists.low.len();
        for run in lists.high.into_iter().chain(lists.low) {
            self.source.free_pages(run);
        }
        if released > 0 {
            debug!(
                "Destroyed order {} pool, released {} cached runs",
                self.order, released
            );
        }
    }
}

/// Factory for [`LockedPagePool`]s over one page source
#[derive(Clone)]
pub struct LockedPoolFactory {
    source: Arc<dyn PageSource>,
}

impl LockedPoolFactory {
    pub fn new(source: Arc<dyn PageSource>) -> Self {
        Self { source }
    }
}

impl PoolFactory for LockedPoolFactory {
    type Pool = LockedPagePool;

    fn create(&self, policy: AllocPolicy, order: Order) -> Option<LockedPagePool> {
        Some(LockedPagePool::new(Arc::clone(&self.source), policy, order))
    }

    fn source(&self) -> &Arc<dyn PageSource> {
        &self.source
    }
}
