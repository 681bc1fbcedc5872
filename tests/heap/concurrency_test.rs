/*!
 * Concurrency Tests
 * Allocation, free, and reclaim racing on one heap
 */

use super::support::{memory, pages, pooled_heap};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use system_heap::{Cacheability, FreeOrigin, HeapBuffer, PressureHint};

const WORKERS: u64 = 4;
const ROUNDS: usize = 200;

fn random_request(rng: &mut StdRng, max_pages: usize) -> (usize, Cacheability) {
    let size = rng.gen_range(1..=pages(max_pages));
    let cacheability = if rng.gen_bool(0.5) {
        Cacheability::Cached
    } else {
        Cacheability::Uncached
    };
    (size, cacheability)
}

#[test]
fn test_concurrent_alloc_free_with_shrinker() {
    let mem = memory(8192);
    let heap = pooled_heap(&mem);
    let stop = AtomicBool::new(false);
    let shrink_calls = AtomicUsize::new(0);

    thread::scope(|s| {
        s.spawn(|| {
            while !stop.load(Ordering::Acquire) {
                heap.shrink(PressureHint::ALL, 64);
                shrink_calls.fetch_add(1, Ordering::Relaxed);
                thread::yield_now();
            }
        });

        let workers: Vec<_> = (0..WORKERS)
            .map(|seed| {
                let heap = &heap;
                s.spawn(move || {
                    let mut rng = StdRng::seed_from_u64(seed);
                    for _ in 0..ROUNDS {
                        let (size, cacheability) = random_request(&mut rng, 128);
                        let buffer = heap.allocate(size, 0, cacheability).unwrap();
                        assert!(buffer.backing_len() >= size);
                        assert_eq!(buffer.cacheability(), cacheability);
                        heap.free(buffer, FreeOrigin::Normal);
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
        stop.store(true, Ordering::Release);
    });

    assert!(shrink_calls.load(Ordering::Relaxed) > 0);
    assert_eq!(heap.shrink(PressureHint::ALL, usize::MAX), 0);
    assert_eq!(mem.allocated_pages(), 0);
}

#[test]
fn test_held_buffers_never_overlap() {
    let mem = memory(8192);
    let heap = pooled_heap(&mem);
    let held: Mutex<Vec<HeapBuffer>> = Mutex::new(Vec::new());

    thread::scope(|s| {
        for seed in 0..WORKERS {
            let heap = &heap;
            let held = &held;
            s.spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed + 100);
                for _ in 0..8 {
                    let (size, cacheability) = random_request(&mut rng, 128);
                    let buffer = heap.allocate(size, 0, cacheability).unwrap();
                    held.lock().push(buffer);
                }
            });
        }
    });

    let held = held.into_inner();
    let mut frames: Vec<usize> = held.iter().flat_map(|buffer| buffer.pfns()).collect();
    let total = frames.len();
    frames.sort_unstable();
    frames.dedup();
    assert_eq!(frames.len(), total);
    assert_eq!(mem.allocated_pages(), total);

    for buffer in held {
        heap.free(buffer, FreeOrigin::Normal);
    }
    assert_eq!(heap.shrink(PressureHint::ALL, 0), total);
}

#[test]
fn test_deferred_queue_drained_by_reclaimer() {
    let mem = memory(8192);
    let heap = pooled_heap(&mem);
    let queue: Mutex<Vec<HeapBuffer>> = Mutex::new(Vec::new());
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        // Reclaimer: drain pools, then release queued buffers without
        // refilling them
        s.spawn(|| loop {
            let finished = done.load(Ordering::Acquire);
            heap.shrink(PressureHint::ALL, usize::MAX);
            let pending: Vec<HeapBuffer> = queue.lock().drain(..).collect();
            for buffer in pending {
                heap.free(buffer, FreeOrigin::ReclaimDriven);
            }
            if finished {
                break;
            }
            thread::yield_now();
        });

        let producers: Vec<_> = (0..WORKERS)
            .map(|seed| {
                let heap = &heap;
                let queue = &queue;
                s.spawn(move || {
                    let mut rng = StdRng::seed_from_u64(seed + 200);
                    for _ in 0..ROUNDS / 4 {
                        let (size, cacheability) = random_request(&mut rng, 16);
                        let buffer = heap.allocate(size, 0, cacheability).unwrap();
                        queue.lock().push(buffer);
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }
        done.store(true, Ordering::Release);
    });

    assert!(queue.lock().is_empty());
    assert_eq!(heap.resident_pages(PressureHint::ALL), 0);
    assert_eq!(mem.allocated_pages(), 0);
}
