/*!
 * Error Types
 * Heap error handling with thiserror, miette, and serde support
 */

use super::types::{Order, Size};
use crate::heap::Cacheability;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Heap operation result
pub type HeapResult<T> = Result<T, HeapError>;

/// Heap errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum HeapError {
    #[error("Invalid argument: {0}")]
    #[diagnostic(
        code(heap::invalid_argument),
        help("Check the requested length and alignment against the heap's limits.")
    )]
    InvalidArgument(String),

    #[error("Out of memory: could not satisfy a request of {requested} bytes")]
    #[diagnostic(
        code(heap::out_of_memory),
        help("Shrink the page pools and retry, or request a smaller buffer.")
    )]
    OutOfMemory { requested: Size },

    #[error("Invalid heap configuration: {0}")]
    #[diagnostic(
        code(heap::invalid_config),
        help("Size classes must be non-empty, strictly descending, and end at order 0.")
    )]
    InvalidConfig(String),

    #[error("Failed to create {cacheability} page pool for order {order}")]
    #[diagnostic(
        code(heap::pool_creation_failed),
        help("The pool factory could not set up a pool. No partial bank was kept.")
    )]
    PoolCreationFailed {
        cacheability: Cacheability,
        order: Order,
    },
}

impl HeapError {
    pub(crate) fn invalid_argument(reason: impl Into<String>) -> Self {
        HeapError::InvalidArgument(reason.into())
    }

    pub(crate) fn out_of_memory(requested: Size) -> Self {
        HeapError::OutOfMemory { requested }
    }
}
