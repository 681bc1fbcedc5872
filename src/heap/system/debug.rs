/*!
 * System Heap Diagnostics
 * Per-pool residency report
 */

use super::SystemHeap;
use crate::core::types::{Order, Size};
use crate::heap::bank::PoolBank;
use crate::heap::Cacheability;
use crate::memory::page::order_to_size;
use crate::memory::{PagePool, PoolFactory};
use serde::Serialize;
use std::fmt;

/// Residency of one pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolUsage {
    pub cacheability: Cacheability,
    pub order: Order,
    pub high_count: usize,
    pub low_count: usize,
    pub high_bytes: Size,
    pub low_bytes: Size,
}

impl PoolUsage {
    fn of<P: PagePool>(pool: &P, cacheability: Cacheability) -> Self {
        let high_count = pool.high_count();
        let low_count = pool.low_count();
        let run = order_to_size(pool.order());
        Self {
            cacheability,
            order: pool.order(),
            high_count,
            low_count,
            high_bytes: high_count * run,
            low_bytes: low_count * run,
        }
    }
}

/// Residency of every pool in a heap, uncached bank first
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeapDebugReport {
    pub heap: String,
    pub pools: Vec<PoolUsage>,
}

impl HeapDebugReport {
    /// Bytes held across all pools
    pub fn total_bytes(&self) -> Size {
        self.pools.iter().map(|p| p.high_bytes + p.low_bytes).sum()
    }

    pub fn pool(&self, cacheability: Cacheability, order: Order) -> Option<&PoolUsage> {
        self.pools
            .iter()
            .find(|p| p.cacheability == cacheability && p.order == order)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for HeapDebugReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "heap '{}' page pools:", self.heap)?;
        for pool in &self.pools {
            writeln!(
                f,
                "{:>5} order {:>2} high-tier runs in {:>8} pool = {:>12} bytes",
                pool.high_count, pool.order, pool.cacheability, pool.high_bytes
            )?;
            writeln!(
                f,
                "{:>5} order {:>2}  low-tier runs in {:>8} pool = {:>12} bytes",
                pool.low_count, pool.order, pool.cacheability, pool.low_bytes
            )?;
        }
        Ok(())
    }
}

fn bank_usage<P: PagePool>(bank: &PoolBank<P>) -> impl Iterator<Item = PoolUsage> + '_ {
    bank.iter().map(move |pool| PoolUsage::of(pool, bank.cacheability()))
}

impl<F: PoolFactory> SystemHeap<F> {
    /// Snapshot of every pool's high-tier and low-tier residency
    pub fn debug_report(&self) -> HeapDebugReport {
        HeapDebugReport {
            heap: self.config.name.clone(),
            pools: bank_usage(&self.uncached)
                .chain(bank_usage(&self.cached))
                .collect(),
        }
    }
}
