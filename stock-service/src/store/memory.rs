use super::{InventoryRecord, StockStore, StockTransaction, StoreFault};
use crate::line_items::ProductId;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Step of a transaction at which an injected fault fires.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FaultPoint {
    Begin,
    Lock,
    Apply,
    Commit,
}

type Rows = Arc<RwLock<HashMap<ProductId, Arc<Mutex<i64>>>>>;
type Faults = Arc<Mutex<Vec<(FaultPoint, StoreFault)>>>;

/// In-process store with one async mutex per inventory row.
///
/// Locks are granted in request order per row, a lock wait is bounded by
/// `lock_timeout`, and writes are staged until commit.
pub struct MemoryStockStore {
    rows: Rows,
    faults: Faults,
    lock_timeout: Duration,
}

impl MemoryStockStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
            faults: Arc::new(Mutex::new(Vec::new())),
            lock_timeout,
        }
    }

    pub async fn with_stock(lock_timeout: Duration, stock: impl IntoIterator<Item = (i64, i64)>) -> Self {
        let store = Self::new(lock_timeout);
        for (product_id, quantity) in stock {
            store.set_stock(ProductId(product_id), quantity).await;
        }
        store
    }

    /// Creates or overwrites a record, waiting for any transaction holding it.
    pub async fn set_stock(&self, product_id: ProductId, quantity: i64) {
        let row = {
            let mut rows = self.rows.write().await;
            rows.entry(product_id)
                .or_insert_with(|| Arc::new(Mutex::new(0)))
                .clone()
        };
        *row.lock().await = quantity;
    }

    /// Committed stock for a product, waiting for any transaction holding it.
    pub async fn stock_of(&self, product_id: ProductId) -> Option<i64> {
        let row = self.rows.read().await.get(&product_id).cloned()?;
        let value = *row.lock().await;
        Some(value)
    }

    /// Makes the next operation of kind `point`, in any transaction, fail with `fault`.
    pub async fn inject_fault(&self, point: FaultPoint, fault: StoreFault) {
        self.faults.lock().await.push((point, fault));
    }
}

async fn take_fault(faults: &Faults, point: FaultPoint) -> Result<(), StoreFault> {
    let mut pending = faults.lock().await;
    match pending.iter().position(|(p, _)| *p == point) {
        Some(idx) => Err(pending.remove(idx).1),
        None => Ok(()),
    }
}

#[async_trait]
impl StockStore for MemoryStockStore {
    async fn begin(&self) -> Result<Box<dyn StockTransaction>, StoreFault> {
        take_fault(&self.faults, FaultPoint::Begin).await?;
        Ok(Box::new(MemoryStockTransaction {
            rows: self.rows.clone(),
            faults: self.faults.clone(),
            lock_timeout: self.lock_timeout,
            locked: BTreeMap::new(),
            staged: BTreeMap::new(),
        }))
    }
}

pub struct MemoryStockTransaction {
    rows: Rows,
    faults: Faults,
    lock_timeout: Duration,
    locked: BTreeMap<ProductId, OwnedMutexGuard<i64>>,
    staged: BTreeMap<ProductId, i64>,
}

impl MemoryStockTransaction {
    fn current(&self, product_id: ProductId) -> Option<i64> {
        self.staged
            .get(&product_id)
            .copied()
            .or_else(|| self.locked.get(&product_id).map(|guard| **guard))
    }
}

#[async_trait]
impl StockTransaction for MemoryStockTransaction {
    async fn lock_record(&mut self, product_id: ProductId) -> Result<Option<InventoryRecord>, StoreFault> {
        take_fault(&self.faults, FaultPoint::Lock).await?;
        if let Some(stock_quantity) = self.current(product_id) {
            return Ok(Some(InventoryRecord { product_id, stock_quantity }));
        }
        let row = match self.rows.read().await.get(&product_id).cloned() {
            Some(row) => row,
            None => return Ok(None),
        };
        let guard = tokio::time::timeout(self.lock_timeout, row.lock_owned())
            .await
            .map_err(|_| StoreFault::LockTimeout { product_id: Some(product_id) })?;
        let stock_quantity = *guard;
        self.locked.insert(product_id, guard);
        Ok(Some(InventoryRecord { product_id, stock_quantity }))
    }

    async fn apply_delta(&mut self, product_id: ProductId, delta: i64) -> Result<i64, StoreFault> {
        take_fault(&self.faults, FaultPoint::Apply).await?;
        let current = self
            .current(product_id)
            .ok_or_else(|| StoreFault::Internal(format!("inventory row {product_id} is not locked by this transaction")))?;
        let next = current
            .checked_add(delta)
            .filter(|v| *v >= 0)
            .ok_or_else(|| StoreFault::Constraint(format!("stock_quantity for {product_id} out of range")))?;
        self.staged.insert(product_id, next);
        Ok(next)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreFault> {
        take_fault(&self.faults, FaultPoint::Commit).await?;
        let mut this = self;
        let staged = std::mem::take(&mut this.staged);
        for (product_id, value) in staged {
            if let Some(guard) = this.locked.get_mut(&product_id) {
                **guard = value;
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreFault> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropped_transaction_discards_staged_writes() {
        let store = MemoryStockStore::with_stock(Duration::from_millis(50), [(1, 5)]).await;
        {
            let mut tx = store.begin().await.unwrap();
            tx.lock_record(ProductId(1)).await.unwrap();
            assert_eq!(tx.apply_delta(ProductId(1), -3).await.unwrap(), 2);
        }
        assert_eq!(store.stock_of(ProductId(1)).await, Some(5));
    }

    #[tokio::test]
    async fn second_locker_times_out_while_row_is_held() {
        let store = MemoryStockStore::with_stock(Duration::from_millis(20), [(1, 5)]).await;
        let mut holder = store.begin().await.unwrap();
        holder.lock_record(ProductId(1)).await.unwrap();

        let mut waiter = store.begin().await.unwrap();
        let err = waiter.lock_record(ProductId(1)).await.unwrap_err();
        assert_eq!(err, StoreFault::LockTimeout { product_id: Some(ProductId(1)) });

        holder.rollback().await.unwrap();
        let record = waiter.lock_record(ProductId(1)).await.unwrap().unwrap();
        assert_eq!(record.stock_quantity, 5);
    }

    #[tokio::test]
    async fn negative_stock_is_a_constraint_violation() {
        let store = MemoryStockStore::with_stock(Duration::from_millis(20), [(1, 1)]).await;
        let mut tx = store.begin().await.unwrap();
        tx.lock_record(ProductId(1)).await.unwrap();
        assert!(matches!(tx.apply_delta(ProductId(1), -2).await, Err(StoreFault::Constraint(_))));
    }

    #[tokio::test]
    async fn injected_fault_fires_once() {
        let store = MemoryStockStore::new(Duration::from_millis(20));
        store.inject_fault(FaultPoint::Begin, StoreFault::Unavailable("down".into())).await;
        assert!(store.begin().await.is_err());
        assert!(store.begin().await.is_ok());
    }
}
