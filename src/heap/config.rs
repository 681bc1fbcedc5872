/*!
 * Heap Configuration
 * Size-class table and system heap settings, validated at construction
 */

use crate::core::errors::{HeapError, HeapResult};
use crate::core::limits::{DEFAULT_SIZE_CLASS_ORDERS, DEFAULT_SYSTEM_HEAP_NAME, MAX_PAGE_ORDER};
use crate::core::types::{Order, Size};
use crate::memory::page::order_to_size;
use serde::{Deserialize, Serialize};

/// Supported run orders, strictly descending, ending at order 0
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Order>", into = "Vec<Order>")]
pub struct SizeClasses(Vec<Order>);

impl SizeClasses {
    pub fn new(orders: Vec<Order>) -> HeapResult<Self> {
        if orders.is_empty() {
            return Err(HeapError::InvalidConfig("size class list is empty".into()));
        }
        if let Some(pair) = orders.windows(2).find(|pair| pair[0] <= pair[1]) {
            return Err(HeapError::InvalidConfig(format!(
                "size classes must be strictly descending, found {} before {}",
                pair[0], pair[1]
            )));
        }
        if orders.last() != Some(&0) {
            return Err(HeapError::InvalidConfig(
                "smallest size class must be order 0".into(),
            ));
        }
        if orders[0] > MAX_PAGE_ORDER {
            return Err(HeapError::InvalidConfig(format!(
                "order {} exceeds the largest supported order {}",
                orders[0], MAX_PAGE_ORDER
            )));
        }
        Ok(Self(orders))
    }

    /// Orders, largest first
    pub fn orders(&self) -> &[Order] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = Order> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn largest(&self) -> Order {
        self.0[0]
    }

    /// Bytes in a run of the largest class
    pub fn largest_size(&self) -> Size {
        order_to_size(self.largest())
    }

    /// Position of `order` in the table
    pub fn index_of(&self, order: Order) -> Option<usize> {
        self.0.iter().position(|&o| o == order)
    }
}

impl Default for SizeClasses {
    fn default() -> Self {
        Self(DEFAULT_SIZE_CLASS_ORDERS.to_vec())
    }
}

impl TryFrom<Vec<Order>> for SizeClasses {
    type Error = HeapError;

    fn try_from(orders: Vec<Order>) -> HeapResult<Self> {
        Self::new(orders)
    }
}

impl From<SizeClasses> for Vec<Order> {
    fn from(classes: SizeClasses) -> Self {
        classes.0
    }
}

/// System heap settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemHeapConfig {
    /// Name used in logs and diagnostics
    #[serde(default = "default_heap_name")]
    pub name: String,
    #[serde(default)]
    pub size_classes: SizeClasses,
}

fn default_heap_name() -> String {
    DEFAULT_SYSTEM_HEAP_NAME.to_string()
}

impl SystemHeapConfig {
    pub fn new(name: impl Into<String>, size_classes: SizeClasses) -> Self {
        Self {
            name: name.into(),
            size_classes,
        }
    }

    /// Parse a JSON config, validating the size-class table
    pub fn from_json(json: &str) -> HeapResult<Self> {
        serde_json::from_str(json).map_err(|e| HeapError::InvalidConfig(e.to_string()))
    }
}

impl Default for SystemHeapConfig {
    fn default() -> Self {
        Self {
            name: default_heap_name(),
            size_classes: SizeClasses::default(),
        }
    }
}
