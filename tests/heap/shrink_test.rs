/*!
 * Reclaim Tests
 * Pool draining under memory pressure and deferred frees
 */

use super::support::{memory, pages, pooled_heap};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use system_heap::{
    Cacheability, ContiguousHeap, FreeOrigin, Heap, HeapBuffer, PagePool, PhysicalMemory,
    PressureHint, ShrinkOutcome, SystemHeap,
};

/// Allocate and immediately free, leaving the runs in the pools
fn park(heap: &SystemHeap, size: usize, cacheability: Cacheability) {
    let buffer = heap.allocate(size, 0, cacheability).unwrap();
    heap.free(buffer, FreeOrigin::Normal);
}

#[test]
fn test_scan_zero_reports_without_freeing() {
    let mem = memory(1024);
    let heap = pooled_heap(&mem);
    park(&heap, pages(273), Cacheability::Uncached);
    park(&heap, pages(16), Cacheability::Cached);

    assert_eq!(heap.shrink(PressureHint::ALL, 0), 289);
    assert_eq!(mem.allocated_pages(), 289);
    assert_eq!(
        heap.reclaim(PressureHint::ALL, 0),
        ShrinkOutcome {
            freed: 0,
            resident: 289
        }
    );
}

#[test]
fn test_shrink_everything() {
    let mem = memory(1024);
    let heap = pooled_heap(&mem);
    park(&heap, pages(273), Cacheability::Uncached);
    park(&heap, pages(16), Cacheability::Cached);

    assert_eq!(heap.shrink(PressureHint::ALL, 289), 0);
    assert_eq!(mem.allocated_pages(), 0);
}

#[test]
fn test_shrink_more_than_resident() {
    let mem = memory(1024);
    let heap = pooled_heap(&mem);
    park(&heap, pages(17), Cacheability::Cached);

    let outcome = heap.reclaim(PressureHint::ALL, 10_000);
    assert_eq!(
        outcome,
        ShrinkOutcome {
            freed: 17,
            resident: 0
        }
    );
    assert_eq!(heap.shrink(PressureHint::ALL, 10_000), 0);
}

#[test]
fn test_drain_largest_class_first() {
    let mem = memory(2048);
    let heap = pooled_heap(&mem);
    park(&heap, pages(256), Cacheability::Uncached);
    park(&heap, pages(256), Cacheability::Cached);
    park(&heap, pages(1), Cacheability::Uncached);

    // Uncached order 8 goes first
    let outcome = heap.reclaim(PressureHint::ALL, 1);
    assert_eq!(outcome.freed, 256);
    assert_eq!(outcome.resident, 257);
    assert_eq!(heap.bank(Cacheability::Uncached).pool_for(8).resident_pages(), 0);
    assert_eq!(heap.bank(Cacheability::Cached).pool_for(8).resident_pages(), 256);

    // Then cached order 8, before any smaller class
    let outcome = heap.reclaim(PressureHint::ALL, 1);
    assert_eq!(outcome.freed, 256);
    assert_eq!(outcome.resident, 1);
    assert_eq!(heap.bank(Cacheability::Uncached).pool_for(0).resident_pages(), 1);
}

#[test]
fn test_pools_only_asked_for_outstanding_pages() {
    let mem = memory(1024);
    let heap = pooled_heap(&mem);
    park(&heap, pages(48), Cacheability::Cached);
    assert_eq!(heap.bank(Cacheability::Cached).pool_for(4).low_count(), 3);

    let outcome = heap.reclaim(PressureHint::ALL, 20);
    assert_eq!(
        outcome,
        ShrinkOutcome {
            freed: 32,
            resident: 16
        }
    );
}

#[test]
fn test_low_tier_only_pressure() {
    let mem = Arc::new(PhysicalMemory::with_high_tier(2048, 256));
    let heap = pooled_heap(&mem);

    // First run lands at pfn 0 (low tier), the second at pfn 256 (high tier)
    let low = heap.allocate(pages(256), 0, Cacheability::Uncached).unwrap();
    let high = heap.allocate(pages(256), 0, Cacheability::Uncached).unwrap();
    assert_eq!(low.sg_table().entries()[0].pfn, 0);
    assert_eq!(high.sg_table().entries()[0].pfn, 256);
    heap.free(low, FreeOrigin::Normal);
    heap.free(high, FreeOrigin::Normal);

    let pool = heap.bank(Cacheability::Uncached).pool_for(8);
    assert_eq!(pool.high_count(), 1);
    assert_eq!(pool.low_count(), 1);

    assert_eq!(heap.shrink(PressureHint::LOW_TIER_ONLY, 0), 256);
    assert_eq!(heap.shrink(PressureHint::ALL, 0), 512);

    let outcome = heap.reclaim(PressureHint::LOW_TIER_ONLY, usize::MAX);
    assert_eq!(
        outcome,
        ShrinkOutcome {
            freed: 256,
            resident: 0
        }
    );
    assert_eq!(pool.high_count(), 1);
    assert_eq!(mem.allocated_pages(), 256);

    // Allocation still prefers the remaining high-tier run
    let again = heap.allocate(pages(256), 0, Cacheability::Uncached).unwrap();
    assert_eq!(again.sg_table().entries()[0].pfn, 256);
    heap.free(again, FreeOrigin::ReclaimDriven);
    assert_eq!(mem.allocated_pages(), 0);
}

#[test]
fn test_shrink_through_heap_trait() {
    let mem = memory(1024);
    let system = pooled_heap(&mem);
    let contig = ContiguousHeap::new(mem.clone());
    park(&system, pages(20), Cacheability::Cached);

    let heaps: [&dyn Heap; 2] = [&system, &contig];
    assert_eq!(heaps[0].shrink(PressureHint::ALL, 0), 20);
    assert_eq!(heaps[1].shrink(PressureHint::ALL, 0), 0);
    assert_eq!(heaps[0].shrink(PressureHint::ALL, 100), 0);
}

#[test]
fn test_deferred_frees_during_reclaim() {
    let mem = memory(2048);
    let heap = pooled_heap(&mem);
    let deferred: Mutex<Vec<HeapBuffer>> = Mutex::new(Vec::new());

    park(&heap, pages(64), Cacheability::Cached);
    for size in [pages(300), pages(17), pages(3)] {
        let buffer = heap.allocate(size, 0, Cacheability::Uncached).unwrap();
        deferred.lock().push(buffer);
    }
    let queued_pages: usize = deferred
        .lock()
        .iter()
        .map(|buffer| buffer.backing_len() / system_heap::core::limits::PAGE_SIZE)
        .sum();
    assert_eq!(queued_pages, 320);

    // Memory pressure: drain the pools, then release the queue without
    // refilling them
    assert_eq!(heap.shrink(PressureHint::ALL, usize::MAX), 0);
    for buffer in deferred.lock().drain(..) {
        heap.free(buffer, FreeOrigin::ReclaimDriven);
    }

    assert_eq!(heap.resident_pages(PressureHint::ALL), 0);
    assert_eq!(mem.allocated_pages(), 0);
}
