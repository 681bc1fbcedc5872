/*!
 * Contiguous Heap
 *
 * Buffers backed by a single physically contiguous run, for devices that
 * cannot scatter-gather. No pooling: every allocation and free goes straight
 * to the page source. The power-of-two run is split into single pages and
 * the tail beyond the requested length is returned immediately.
 */

use super::buffer::{HeapBuffer, SgEntry, SgTable};
use super::{Cacheability, FreeOrigin, Heap, HeapType};
use crate::core::errors::{HeapError, HeapResult};
use crate::core::limits::{DEFAULT_CONTIG_HEAP_NAME, MAX_PAGE_ORDER};
use crate::core::types::{PhysAddr, Size};
use crate::memory::page::{get_order, order_to_size, page_align, size_to_pages};
use crate::memory::{AllocPolicy, PageSource};
use crate::monitoring::span_heap_op;
use log::{debug, info, warn};
use std::sync::Arc;

/// Physically contiguous heap
pub struct ContiguousHeap {
    name: String,
    source: Arc<dyn PageSource>,
}

impl ContiguousHeap {
    pub fn new(source: Arc<dyn PageSource>) -> Self {
        Self::with_name(DEFAULT_CONTIG_HEAP_NAME, source)
    }

    pub fn with_name(name: impl Into<String>, source: Arc<dyn PageSource>) -> Self {
        let name = name.into();
        info!("Contiguous heap '{}' initialized", name);
        Self { name, source }
    }

    /// Allocate one contiguous run covering `len` bytes
    ///
    /// `align` may be as large as the power-of-two run implied by `len`.
    pub fn allocate(
        &self,
        len: Size,
        align: Size,
        cacheability: Cacheability,
    ) -> HeapResult<HeapBuffer> {
        if len == 0 {
            return Err(HeapError::invalid_argument("zero-length allocation"));
        }

        let order = get_order(len);
        if order > MAX_PAGE_ORDER {
            warn!(
                "Contiguous heap '{}' cannot place {} bytes: needs order {}, largest is {}",
                self.name, len, order, MAX_PAGE_ORDER
            );
            return Err(HeapError::out_of_memory(len));
        }
        if align > order_to_size(order) {
            return Err(HeapError::invalid_argument(format!(
                "alignment {} exceeds the {} byte run backing a {} byte buffer",
                align,
                order_to_size(order),
                len
            )));
        }

        let span = span_heap_op("allocate", &self.name, len);
        let _entered = span.enter();
        let Some(run) = self.source.alloc_pages(AllocPolicy::LowOrder, order) else {
            warn!(
                "Contiguous heap '{}' could not find an order {} run for {} bytes",
                self.name, order, len
            );
            span.record_result(false);
            return Err(HeapError::out_of_memory(len));
        };

        let mut pages = self.source.split_page(run);
        let kept = size_to_pages(len);
        let trimmed = pages.len() - kept;
        for page in pages.drain(kept..) {
            self.source.free_pages(page);
        }

        let length = page_align(len);
        let mut table = match SgTable::try_with_capacity(1) {
            Ok(table) => table,
            Err(_) => {
                for page in pages {
                    self.source.free_pages(page);
                }
                span.record_result(false);
                return Err(HeapError::out_of_memory(len));
            }
        };
        table.push(SgEntry {
            pfn: pages[0].pfn(),
            length,
        });

        debug!(
            "Contiguous heap '{}' allocated {} pages at pfn {}, trimmed {}",
            self.name,
            kept,
            pages[0].pfn(),
            trimmed
        );
        span.record_segments(1);
        span.record_result(true);
        Ok(HeapBuffer::new(
            HeapType::SystemContig,
            len,
            cacheability,
            table,
            pages,
        ))
    }

    /// Return every page of the buffer to the page source, one at a time
    pub fn free(&self, buffer: HeapBuffer) {
        assert_eq!(
            buffer.heap_type(),
            HeapType::SystemContig,
            "{} buffer freed on contiguous heap '{}'",
            buffer.heap_type(),
            self.name
        );

        let size = buffer.size();
        let (_table, pages) = buffer.into_parts();
        let count = pages.len();
        for page in pages {
            self.source.free_pages(page);
        }
        debug!(
            "Contiguous heap '{}' freed {} byte buffer ({} pages)",
            self.name, size, count
        );
    }

    /// Physical address of the first page and the requested length
    pub fn phys(&self, buffer: &HeapBuffer) -> HeapResult<(PhysAddr, Size)> {
        match buffer.sg_table().entries().first() {
            Some(entry) if buffer.heap_type() == HeapType::SystemContig => {
                Ok((entry.phys_addr(), buffer.size()))
            }
            _ => Err(HeapError::invalid_argument(format!(
                "{} buffer is not physically contiguous",
                buffer.heap_type()
            ))),
        }
    }
}

impl Heap for ContiguousHeap {
    fn name(&self) -> &str {
        &self.name
    }

    fn heap_type(&self) -> HeapType {
        HeapType::SystemContig
    }

    fn allocate(
        &self,
        size: Size,
        align: Size,
        cacheability: Cacheability,
    ) -> HeapResult<HeapBuffer> {
        ContiguousHeap::allocate(self, size, align, cacheability)
    }

    fn free(&self, buffer: HeapBuffer, _origin: FreeOrigin) {
        ContiguousHeap::free(self, buffer)
    }

    fn phys(&self, buffer: &HeapBuffer) -> HeapResult<(PhysAddr, Size)> {
        ContiguousHeap::phys(self, buffer)
    }
}
