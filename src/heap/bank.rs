/*!
 * Pool Banks
 * One page pool per size class for a single cacheability attribute
 */

use super::config::SizeClasses;
use super::Cacheability;
use crate::core::errors::{HeapError, HeapResult};
use crate::core::types::Order;
use crate::memory::{AllocPolicy, PagePool, PoolFactory, PressureHint};
use log::{debug, warn};

/// Pools indexed like the heap's size-class table
///
/// Creation is all-or-nothing: if any pool cannot be created, the pools
/// built so far are dropped (releasing their pages) before the error
/// is returned. Dropping a bank destroys every pool in it.
pub struct PoolBank<P: PagePool> {
    cacheability: Cacheability,
    pools: Vec<P>,
}

impl<P: PagePool> PoolBank<P> {
    pub fn create<F>(
        factory: &F,
        classes: &SizeClasses,
        cacheability: Cacheability,
    ) -> HeapResult<Self>
    where
        F: PoolFactory<Pool = P>,
    {
        let mut pools = Vec::with_capacity(classes.len());
        for order in classes.iter() {
            let policy = AllocPolicy::for_order(order);
            let Some(pool) = factory.create(policy, order) else {
                warn!(
                    "Failed to create {} pool for order {}, unwinding {} pools",
                    cacheability,
                    order,
                    pools.len()
                );
                return Err(HeapError::PoolCreationFailed {
                    cacheability,
                    order,
                });
            };
            pools.push(pool);
        }

        debug!("Created {} pool bank with {} pools", cacheability, pools.len());
        Ok(Self {
            cacheability,
            pools,
        })
    }

    pub fn cacheability(&self) -> Cacheability {
        self.cacheability
    }

    /// Pool at size-class index `index`
    #[inline]
    pub fn pool_at(&self, index: usize) -> &P {
        &self.pools[index]
    }

    /// Pool serving runs of `order`
    ///
    /// Every run the heap hands out comes from one of its classes, so an
    /// unknown order means a foreign run and panics.
    pub fn pool_for(&self, order: Order) -> &P {
        self.pools
            .iter()
            .find(|pool| pool.order() == order)
            .unwrap_or_else(|| panic!("no {} pool for order {}", self.cacheability, order))
    }

    pub fn iter(&self) -> impl Iterator<Item = &P> {
        self.pools.iter()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Reclaimable base pages across the bank
    pub fn resident_pages(&self, hint: PressureHint) -> usize {
        self.pools.iter().map(|pool| pool.shrink(hint, 0)).sum()
    }
}

impl<P: PagePool> Drop for PoolBank<P> {
    fn drop(&mut self) {
        debug!(
            "Destroying {} pool bank ({} pages resident)",
            self.cacheability,
            self.pools.iter().map(|pool| pool.resident_pages()).sum::<usize>()
        );
    }
}
