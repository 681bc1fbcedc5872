/*!
 * Monitoring
 * Structured tracing for heap operations
 */

mod tracer;

pub use tracer::{init_tracing, span_heap_op, HeapOpSpan};
