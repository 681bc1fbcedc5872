/*!
 * System Heap Reclaim
 * Draining page pools under memory pressure
 */

use super::SystemHeap;
use crate::memory::{PagePool, PoolFactory, PressureHint};
use log::debug;
use serde::{Deserialize, Serialize};

/// Result of one reclaim pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShrinkOutcome {
    /// Base pages released to the page source by this pass
    pub freed: usize,
    /// Reclaimable base pages left in the pools afterwards
    pub resident: usize,
}

impl<F: PoolFactory> SystemHeap<F> {
    /// Answer a memory-pressure request
    ///
    /// With `nr_to_scan == 0` nothing is freed. The return value is always
    /// the number of reclaimable pages still resident in the pools after
    /// the pass, not the number freed; use [`SystemHeap::reclaim`] for both.
    pub fn shrink(&self, hint: PressureHint, nr_to_scan: usize) -> usize {
        self.reclaim(hint, nr_to_scan).resident
    }

    /// Drain pools, largest class first, uncached before cached within a
    /// class, until at least `nr_to_scan` pages were freed
    pub fn reclaim(&self, hint: PressureHint, nr_to_scan: usize) -> ShrinkOutcome {
        let mut freed = 0;

        if nr_to_scan > 0 {
            'drain: for index in 0..self.size_classes().len() {
                for bank in [&self.uncached, &self.cached] {
                    freed += bank.pool_at(index).shrink(hint, nr_to_scan - freed);
                    if freed >= nr_to_scan {
                        break 'drain;
                    }
                }
            }
        }

        let resident = self.resident_pages(hint);
        if nr_to_scan > 0 {
            debug!(
                "Heap '{}' reclaim: asked {}, freed {}, {} pages still resident",
                self.config.name, nr_to_scan, freed, resident
            );
        }

        ShrinkOutcome { freed, resident }
    }

    /// Reclaimable pages across both banks
    pub fn resident_pages(&self, hint: PressureHint) -> usize {
        self.uncached.resident_pages(hint) + self.cached.resident_pages(hint)
    }
}
