//! Transactional inventory store contract and its backends.

use crate::line_items::ProductId;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub mod memory;
pub mod postgres;

pub use memory::{FaultPoint, MemoryStockStore};
pub use postgres::PgStockStore;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryRecord {
    pub product_id: ProductId,
    pub stock_quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreFault {
    #[error("lock wait timeout (product {product_id:?})")]
    LockTimeout { product_id: Option<ProductId> },
    #[error("transaction chosen as deadlock victim")]
    Deadlock,
    #[error("could not serialize access")]
    Serialization,
    #[error("constraint violation: {0}")]
    Constraint(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store failure: {0}")]
    Internal(String),
}

impl StoreFault {
    /// Faults where the store aborted the whole transaction and a fresh attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreFault::Deadlock | StoreFault::Serialization)
    }

    /// Coarse class exposed to callers in place of the fault text.
    pub fn class(&self) -> &'static str {
        match self {
            StoreFault::LockTimeout { .. } => "timeout",
            StoreFault::Deadlock | StoreFault::Serialization => "conflict",
            StoreFault::Unavailable(_) => "unavailable",
            StoreFault::Constraint(_) | StoreFault::Internal(_) => "internal",
        }
    }
}

#[async_trait]
pub trait StockStore: Send + Sync {
    /// Opens a transaction. The backend's lock wait bound applies to every lock taken in it.
    async fn begin(&self) -> Result<Box<dyn StockTransaction>, StoreFault>;
}

/// One open store transaction.
///
/// Dropping it without calling [`commit`](StockTransaction::commit) discards every
/// change and releases every lock.
#[async_trait]
pub trait StockTransaction: Send {
    /// Takes an exclusive row lock and reads the record. `None` when no record exists.
    async fn lock_record(&mut self, product_id: ProductId) -> Result<Option<InventoryRecord>, StoreFault>;

    /// Adds `delta` to a record locked in this transaction and returns the new stock.
    async fn apply_delta(&mut self, product_id: ProductId, delta: i64) -> Result<i64, StoreFault>;

    async fn commit(self: Box<Self>) -> Result<(), StoreFault>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreFault>;
}
