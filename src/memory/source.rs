/*!
 * Page Source
 * Interface to the general-purpose page allocator
 */

use super::page::PageRun;
use crate::core::types::Order;
use serde::{Deserialize, Serialize};

/// How hard the page source may try to satisfy a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocPolicy {
    /// Opportunistic: no blocking, no retry, no failure warning.
    /// Used for multi-page runs where falling back to a smaller class is cheap.
    HighOrder,
    /// May block and reclaim to make progress. Used for single pages.
    LowOrder,
}

impl AllocPolicy {
    /// Policy a pool of the given order allocates with
    #[inline]
    pub fn for_order(order: Order) -> Self {
        if order > 0 {
            AllocPolicy::HighOrder
        } else {
            AllocPolicy::LowOrder
        }
    }

    #[inline]
    pub fn may_block(self) -> bool {
        matches!(self, AllocPolicy::LowOrder)
    }
}

/// General-purpose physical page allocator
///
/// Implementations serialize their own state; every method may be called
/// from any thread.
pub trait PageSource: Send + Sync {
    /// Allocate a zero-filled, naturally aligned run of `2^order` pages
    fn alloc_pages(&self, policy: AllocPolicy, order: Order) -> Option<PageRun>;

    /// Return a run. Returning a run that is not allocated at exactly its
    /// order is an invariant violation and panics.
    fn free_pages(&self, run: PageRun);

    /// Break an allocated run into `2^order` order-0 runs, ascending by frame
    fn split_page(&self, run: PageRun) -> Vec<PageRun>;

    /// Clear the contents of every page in the run
    fn zero_pages(&self, run: &PageRun);

    /// Pages of memory managed by this source
    fn total_pages(&self) -> usize;
}
