use super::{InventoryRecord, StockStore, StockTransaction, StoreFault};
use crate::line_items::ProductId;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};
use std::time::Duration;

pub(crate) const LOCK_RECORD_SQL: &str =
    "SELECT product_id, stock_quantity FROM inventory WHERE product_id = $1 FOR UPDATE";

pub(crate) const APPLY_DELTA_SQL: &str =
    "UPDATE inventory SET stock_quantity = stock_quantity + $1, updated_at = NOW() WHERE product_id = $2 RETURNING stock_quantity";

#[derive(Debug, sqlx::FromRow)]
struct InventoryRow {
    product_id: i64,
    stock_quantity: i64,
}

#[derive(Clone)]
pub struct PgStockStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStockStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    pub async fn connect(database_url: &str, max_connections: u32, lock_timeout: Duration) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool, lock_timeout))
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn lock_timeout_sql(timeout: Duration) -> String {
    // SET does not take bind parameters; the value is a plain integer.
    format!("SET LOCAL lock_timeout = '{}ms'", timeout.as_millis().max(1))
}

#[async_trait]
impl StockStore for PgStockStore {
    async fn begin(&self) -> Result<Box<dyn StockTransaction>, StoreFault> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&lock_timeout_sql(self.lock_timeout))
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgStockTransaction { tx }))
    }
}

pub struct PgStockTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StockTransaction for PgStockTransaction {
    async fn lock_record(&mut self, product_id: ProductId) -> Result<Option<InventoryRecord>, StoreFault> {
        let row = sqlx::query_as::<_, InventoryRow>(LOCK_RECORD_SQL)
            .bind(product_id.0)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|err| match StoreFault::from(err) {
                StoreFault::LockTimeout { .. } => StoreFault::LockTimeout { product_id: Some(product_id) },
                other => other,
            })?;
        Ok(row.map(|r| InventoryRecord {
            product_id: ProductId(r.product_id),
            stock_quantity: r.stock_quantity,
        }))
    }

    async fn apply_delta(&mut self, product_id: ProductId, delta: i64) -> Result<i64, StoreFault> {
        sqlx::query_scalar::<_, i64>(APPLY_DELTA_SQL)
            .bind(delta)
            .bind(product_id.0)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| StoreFault::Internal(format!("inventory row {product_id} disappeared while locked")))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreFault> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreFault> {
        self.tx.rollback().await?;
        Ok(())
    }
}

impl From<sqlx::Error> for StoreFault {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => {
                let message = db.message().to_string();
                match db.code().as_deref() {
                    Some("55P03") => StoreFault::LockTimeout { product_id: None },
                    Some("40P01") => StoreFault::Deadlock,
                    Some("40001") => StoreFault::Serialization,
                    Some(code) if code.starts_with("23") => StoreFault::Constraint(message),
                    Some(code) if code.starts_with("08") || code.starts_with("57P") => StoreFault::Unavailable(message),
                    _ => StoreFault::Internal(message),
                }
            }
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => StoreFault::Unavailable(err.to_string()),
            other => StoreFault::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_query_takes_row_lock() {
        assert!(LOCK_RECORD_SQL.ends_with("FOR UPDATE"));
        assert!(LOCK_RECORD_SQL.contains("WHERE product_id = $1"));
    }

    #[test]
    fn lock_timeout_statement_uses_milliseconds() {
        assert_eq!(lock_timeout_sql(Duration::from_secs(5)), "SET LOCAL lock_timeout = '5000ms'");
        // 0ms would disable the timeout in Postgres.
        assert_eq!(lock_timeout_sql(Duration::ZERO), "SET LOCAL lock_timeout = '1ms'");
    }

    #[test]
    fn pool_errors_map_to_unavailable() {
        let fault = StoreFault::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(fault, StoreFault::Unavailable(_)));
        assert_eq!(fault.class(), "unavailable");
        assert!(!fault.is_retryable());
    }
}
