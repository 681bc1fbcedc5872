/*!
 * Heap Tracing
 * Structured tracing for heap operations using the tracing crate
 *
 * Features:
 * - JSON-formatted logs for structured parsing
 * - `log` records from the heap forwarded into the same subscriber
 * - Per-operation spans with duration and slow-operation warnings
 */

use crate::core::limits::SLOW_HEAP_OP_THRESHOLD;
use crate::core::types::Size;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

static NEXT_OP_ID: AtomicU64 = AtomicU64::new(1);

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - SYSHEAP_TRACE_JSON: Enable JSON output (default: false)
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("SYSHEAP_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_file(true)
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .init();
        info!("Structured tracing initialized with JSON output");
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .init();
        info!("Structured tracing initialized");
    }
}

/// Span for one heap operation
///
/// Logs the duration on drop; operations slower than
/// `SLOW_HEAP_OP_THRESHOLD` are reported at warn level.
pub struct HeapOpSpan {
    span: tracing::Span,
    start: Instant,
    op_id: u64,
    operation: &'static str,
}

impl HeapOpSpan {
    pub fn new(operation: &'static str, heap: &str, size: Size) -> Self {
        let op_id = NEXT_OP_ID.fetch_add(1, Ordering::Relaxed);

        let span = span!(
            Level::DEBUG,
            "heap_op",
            op_id = op_id,
            operation = operation,
            heap = heap,
            size = size,
            duration_us = tracing::field::Empty,
            segments = tracing::field::Empty,
            result = tracing::field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            op_id,
            operation,
        }
    }

    pub fn op_id(&self) -> u64 {
        self.op_id
    }

    /// Record the number of scatter entries produced
    pub fn record_segments(&self, count: usize) {
        self.span.record("segments", count);
    }

    pub fn record_result(&self, success: bool) {
        self.span
            .record("result", if success { "success" } else { "error" });
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for HeapOpSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let _entered = self.span.enter();
        self.span.record("duration_us", duration.as_micros() as u64);

        if duration > SLOW_HEAP_OP_THRESHOLD {
            warn!(
                op_id = self.op_id,
                operation = self.operation,
                duration_us = duration.as_micros() as u64,
                slow = true,
                "slow heap operation"
            );
        } else {
            debug!(
                op_id = self.op_id,
                operation = self.operation,
                duration_us = duration.as_micros() as u64,
                "heap operation completed"
            );
        }
    }
}

/// Helper to open a span around a heap operation
#[inline]
pub fn span_heap_op(operation: &'static str, heap: &str, size: Size) -> HeapOpSpan {
    HeapOpSpan::new(operation, heap, size)
}
