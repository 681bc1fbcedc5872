/*!
 * heapctl - System Heap Driver
 *
 * Builds a system heap and a contiguous heap over simulated physical memory,
 * runs a short allocation workload, and prints the pool report.
 *
 * Environment variables:
 * - SYSHEAP_CONFIG: path to a JSON `SystemHeapConfig` (default: built-in classes)
 * - SYSHEAP_PAGES: pages of simulated physical memory (default: 65536)
 */

use std::error::Error;
use std::sync::Arc;
use tracing::info;

use system_heap::core::limits::{DEFAULT_PHYSICAL_PAGES, PAGE_SIZE};
use system_heap::{
    init_tracing, Cacheability, ContiguousHeap, FreeOrigin, PageSource, PhysicalMemory,
    PressureHint, SystemHeap, SystemHeapConfig,
};

fn load_config() -> Result<SystemHeapConfig, Box<dyn Error>> {
    match std::env::var("SYSHEAP_CONFIG") {
        Ok(path) => {
            info!(path = %path, "Loading heap configuration");
            let json = std::fs::read_to_string(&path)?;
            Ok(SystemHeapConfig::from_json(&json)?)
        }
        Err(_) => Ok(SystemHeapConfig::default()),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    let pages = match std::env::var("SYSHEAP_PAGES") {
        Ok(value) => value.parse::<usize>()?,
        Err(_) => DEFAULT_PHYSICAL_PAGES,
    };
    let config = load_config()?;

    info!("heapctl starting...");
    let memory = Arc::new(PhysicalMemory::new(pages));
    let source: Arc<dyn PageSource> = memory.clone();

    let system = SystemHeap::with_source(Arc::clone(&source), config)?;
    let contig = ContiguousHeap::new(Arc::clone(&source));

    // Mixed workload: a large uncached frame buffer, a cached codec buffer,
    // and an odd-sized contiguous DMA buffer
    let frame = system.allocate(3 * 1024 * 1024 + 12 * 1024, PAGE_SIZE, Cacheability::Uncached)?;
    let codec = system.allocate(300 * 1024, 0, Cacheability::Cached)?;
    let dma = contig.allocate(5 * PAGE_SIZE + 100, PAGE_SIZE, Cacheability::Uncached)?;

    info!(
        frame_segments = frame.sg_table().nents(),
        codec_segments = codec.sg_table().nents(),
        allocated_pages = memory.allocated_pages(),
        "Workload allocated"
    );
    let (phys, len) = contig.phys(&dma)?;
    info!(phys = %format!("{:#x}", phys), len, "Contiguous buffer placed");

    system.free(frame, FreeOrigin::Normal);
    system.free(codec, FreeOrigin::Normal);
    contig.free(dma);

    let report = system.debug_report();
    println!("{}", report);

    let outcome = system.reclaim(PressureHint::ALL, usize::MAX);
    info!(
        freed = outcome.freed,
        resident = outcome.resident,
        allocated_pages = memory.allocated_pages(),
        "Pools drained"
    );

    println!("{}", serde_json::to_string_pretty(&memory.stats())?);
    Ok(())
}
