/*!
 * System Heap Allocator
 * Largest-available-first allocation, rollback, and the free path
 */

use super::SystemHeap;
use crate::core::errors::{HeapError, HeapResult};
use crate::core::limits::{MAX_ALLOCATION_DIVISOR, PAGE_SIZE};
use crate::core::types::{Order, Size};
use crate::heap::bank::PoolBank;
use crate::heap::buffer::{HeapBuffer, SgEntry, SgTable};
use crate::heap::{Cacheability, FreeOrigin, HeapType};
use crate::memory::page::{order_to_size, size_to_pages};
use crate::memory::{PagePool, PageRun, PoolFactory};
use crate::monitoring::span_heap_op;
use log::{debug, warn};

/// Runs acquired so far for one allocation
///
/// Until [`SegmentGuard::commit`] is called, dropping the guard hands every
/// run back to the pool it came from.
struct SegmentGuard<'a, P: PagePool> {
    bank: &'a PoolBank<P>,
    segments: Vec<PageRun>,
}

impl<'a, P: PagePool> SegmentGuard<'a, P> {
    fn new(bank: &'a PoolBank<P>) -> Self {
        Self {
            bank,
            segments: Vec::new(),
        }
    }

    fn push(&mut self, run: PageRun) {
        self.segments.push(run);
    }

    fn len(&self) -> usize {
        self.segments.len()
    }

    fn iter(&self) -> impl Iterator<Item = &PageRun> {
        self.segments.iter()
    }

    fn commit(mut self) -> Vec<PageRun> {
        std::mem::take(&mut self.segments)
    }
}

impl<P: PagePool> Drop for SegmentGuard<'_, P> {
    fn drop(&mut self) {
        if self.segments.is_empty() {
            return;
        }
        debug!(
            "Rolling back {} segments to the {} pools",
            self.segments.len(),
            self.bank.cacheability()
        );
        for run in self.segments.drain(..) {
            self.bank.pool_for(run.order()).free(run);
        }
    }
}

impl<F: PoolFactory> SystemHeap<F> {
    /// Allocate a scatter-gather buffer of at least `size` bytes
    ///
    /// Fails with `InvalidArgument` if `align` exceeds one page or `size` is
    /// zero, and with `OutOfMemory` if the request exceeds half of all pages
    /// or the pools and page source cannot cover it. On failure every page
    /// acquired so far is back in its pool.
    pub fn allocate(
        &self,
        size: Size,
        align: Size,
        cacheability: Cacheability,
    ) -> HeapResult<HeapBuffer> {
        if align > PAGE_SIZE {
            return Err(HeapError::invalid_argument(format!(
                "alignment {} exceeds the page size {}",
                align, PAGE_SIZE
            )));
        }
        if size == 0 {
            return Err(HeapError::invalid_argument("zero-length allocation"));
        }

        let pages = size_to_pages(size);
        if pages > self.source.total_pages() / MAX_ALLOCATION_DIVISOR {
            warn!(
                "Rejected {} byte request on heap '{}': more than half of {} pages",
                size,
                self.config.name,
                self.source.total_pages()
            );
            return Err(HeapError::out_of_memory(size));
        }

        let span = span_heap_op("allocate", &self.config.name, size);
        let _entered = span.enter();
        let bank = self.bank(cacheability);
        let mut segments = SegmentGuard::new(bank);
        let mut remaining = pages * PAGE_SIZE;
        let mut max_order = self.size_classes().largest();

        while remaining > 0 {
            let Some(run) = self.alloc_largest_available(bank, remaining, max_order) else {
                warn!(
                    "Heap '{}' could not satisfy {} {} bytes ({} bytes outstanding after {} segments)",
                    self.config.name,
                    cacheability,
                    size,
                    remaining,
                    segments.len()
                );
                span.record_result(false);
                return Err(HeapError::out_of_memory(size));
            };
            remaining -= run.len();
            max_order = run.order();
            segments.push(run);
        }

        let Ok(mut table) = SgTable::try_with_capacity(segments.len()) else {
            span.record_result(false);
            return Err(HeapError::out_of_memory(size));
        };
        for run in segments.iter() {
            table.push(SgEntry {
                pfn: run.pfn(),
                length: run.len(),
            });
        }

        span.record_segments(table.nents());
        span.record_result(true);
        Ok(HeapBuffer::new(
            HeapType::System,
            size,
            cacheability,
            table,
            segments.commit(),
        ))
    }

    /// Take one run of the largest class that fits `remaining` bytes and is
    /// no bigger than `max_order`, falling back to smaller classes when a
    /// pool comes up empty
    fn alloc_largest_available(
        &self,
        bank: &PoolBank<F::Pool>,
        remaining: Size,
        max_order: Order,
    ) -> Option<PageRun> {
        self.size_classes()
            .iter()
            .enumerate()
            .filter(|&(_, order)| order_to_size(order) <= remaining && order <= max_order)
            .find_map(|(index, _)| bank.pool_at(index).alloc())
    }

    /// Release a buffer
    ///
    /// Uncached buffers freed normally are zeroed first so the next borrower
    /// cannot read them. Reclaim-driven frees skip both the zeroing and the
    /// pools and hand pages straight back to the page source.
    pub fn free(&self, buffer: HeapBuffer, origin: FreeOrigin) {
        assert_eq!(
            buffer.heap_type(),
            HeapType::System,
            "{} buffer freed on system heap '{}'",
            buffer.heap_type(),
            self.config.name
        );

        let cacheability = buffer.cacheability();
        let size = buffer.size();

        if origin == FreeOrigin::Normal && cacheability == Cacheability::Uncached {
            for run in buffer.pages() {
                self.source.zero_pages(run);
            }
        }

        let (table, pages) = buffer.into_parts();
        let bank = self.bank(cacheability);
        for run in pages {
            match origin {
                FreeOrigin::Normal => bank.pool_for(run.order()).free(run),
                FreeOrigin::ReclaimDriven => self.source.free_pages(run),
            }
        }

        debug!(
            "Freed {} {} byte buffer ({} segments, {:?}) on heap '{}'",
            cacheability,
            size,
            table.nents(),
            origin,
            self.config.name
        );
    }
}
