/*!
 * Heap Buffers
 * Scatter tables describing allocated buffers, and the buffers that own them
 */

use super::{Cacheability, HeapType};
use crate::core::types::{Order, Pfn, PhysAddr, Size};
use crate::memory::page::{get_order, pfn_to_phys, PageRun};
use serde::{Deserialize, Serialize};
use std::collections::TryReserveError;

/// One physically contiguous span of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SgEntry {
    /// First frame of the span
    pub pfn: Pfn,
    /// Span length in bytes
    pub length: Size,
}

impl SgEntry {
    #[inline]
    pub fn phys_addr(&self) -> PhysAddr {
        pfn_to_phys(self.pfn)
    }

    /// Smallest run order covering the span
    #[inline]
    pub fn order(&self) -> Order {
        get_order(self.length)
    }
}

/// Ordered scatter list of a buffer's physical layout
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SgTable {
    entries: Vec<SgEntry>,
}

impl SgTable {
    /// Table with room for `nents` entries, failing instead of aborting
    /// when the entry storage cannot be allocated
    pub fn try_with_capacity(nents: usize) -> Result<Self, TryReserveError> {
        let mut entries = Vec::new();
        entries.try_reserve_exact(nents)?;
        Ok(Self { entries })
    }

    pub(crate) fn push(&mut self, entry: SgEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[SgEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &SgEntry> {
        self.entries.iter()
    }

    /// Number of entries
    pub fn nents(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all entry lengths
    pub fn total_len(&self) -> Size {
        self.entries.iter().map(|e| e.length).sum()
    }
}

/// An allocated buffer: its scatter table plus ownership of its pages
///
/// Dropping a buffer without handing it back to its heap leaks its pages.
#[derive(Debug)]
pub struct HeapBuffer {
    heap_type: HeapType,
    size: Size,
    cacheability: Cacheability,
    table: SgTable,
    pages: Vec<PageRun>,
}

impl HeapBuffer {
    pub(crate) fn new(
        heap_type: HeapType,
        size: Size,
        cacheability: Cacheability,
        table: SgTable,
        pages: Vec<PageRun>,
    ) -> Self {
        Self {
            heap_type,
            size,
            cacheability,
            table,
            pages,
        }
    }

    pub(crate) fn into_parts(self) -> (SgTable, Vec<PageRun>) {
        (self.table, self.pages)
    }

    pub fn heap_type(&self) -> HeapType {
        self.heap_type
    }

    /// Requested size in bytes
    pub fn size(&self) -> Size {
        self.size
    }

    pub fn cacheability(&self) -> Cacheability {
        self.cacheability
    }

    pub fn sg_table(&self) -> &SgTable {
        &self.table
    }

    /// Bytes actually backing the buffer
    pub fn backing_len(&self) -> Size {
        self.table.total_len()
    }

    /// Every frame owned by the buffer, in layout order
    pub fn pfns(&self) -> impl Iterator<Item = Pfn> + '_ {
        self.pages.iter().flat_map(|run| run.pfns())
    }

    pub(crate) fn pages(&self) -> &[PageRun] {
        &self.pages
    }
}
