//! Locked check-and-mutate protocol for stock decrements and restores.

use crate::line_items::{normalize, NormalizedBatch, RawLineItem};
use crate::outcome::{report, AdjustedLine, AdjustmentError, AdjustmentOutcome, AdjustmentReceipt, StockOperation};
use crate::store::{StockStore, StockTransaction, StoreFault};
use common_observability::StockMetrics;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Runs batch adjustments against a shared store. Holds no per-request state,
/// so one instance is shared by every request task.
pub struct StockController {
    store: Arc<dyn StockStore>,
    metrics: Arc<StockMetrics>,
    max_attempts: u32,
}

impl StockController {
    pub fn new(store: Arc<dyn StockStore>, metrics: Arc<StockMetrics>) -> Self {
        Self { store, metrics, max_attempts: DEFAULT_MAX_ATTEMPTS }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn metrics(&self) -> &Arc<StockMetrics> {
        &self.metrics
    }

    /// Inbound entry point: normalize the raw items, run the operation, report the outcome.
    pub async fn adjust_stock(&self, operation: StockOperation, raw_items: &[RawLineItem]) -> AdjustmentOutcome {
        let result = match normalize(raw_items) {
            Ok(batch) => {
                debug!(operation = operation.as_str(), products = batch.len(), "normalized batch");
                self.run(operation, &batch).await
            }
            Err(err) => {
                debug!(operation = operation.as_str(), error = %err, "batch rejected by normalizer");
                let err = AdjustmentError::from(err);
                self.record(operation, Err(&err));
                Err(err)
            }
        };
        report(operation, result)
    }

    pub async fn decrement(&self, batch: &NormalizedBatch) -> Result<AdjustmentReceipt, AdjustmentError> {
        self.run(StockOperation::Decrement, batch).await
    }

    /// Adds every quantity back. There is no sufficiency check, and nothing ties the
    /// call to an earlier decrement.
    pub async fn restore(&self, batch: &NormalizedBatch) -> Result<AdjustmentReceipt, AdjustmentError> {
        self.run(StockOperation::Restore, batch).await
    }

    /// Decrements `batch`, then runs `step`. If the step fails the decrement is
    /// compensated with a restore of the same batch.
    pub async fn decrement_with_compensation<T, E, F, Fut>(
        &self,
        batch: &NormalizedBatch,
        step: F,
    ) -> Result<(AdjustmentReceipt, T), AdjustmentError>
    where
        F: FnOnce(AdjustmentReceipt) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let receipt = self.decrement(batch).await?;
        let reason = match step(receipt.clone()).await {
            Ok(value) => return Ok((receipt, value)),
            Err(err) => err.to_string(),
        };
        warn!(reason = %reason, products = batch.len(), "downstream step failed; restoring stock");
        match self.restore(batch).await {
            Ok(_) => Err(AdjustmentError::DownstreamFailed { reason }),
            Err(restore_err) => {
                self.metrics.compensation_failures.inc();
                error!(
                    reason = %reason,
                    restore_error = %restore_err,
                    lines = ?receipt.lines,
                    "compensating restore failed; stock left decremented"
                );
                Err(AdjustmentError::CompensationFailed { reason, restore: Box::new(restore_err) })
            }
        }
    }

    async fn run(&self, operation: StockOperation, batch: &NormalizedBatch) -> Result<AdjustmentReceipt, AdjustmentError> {
        if batch.is_empty() {
            let err = AdjustmentError::EmptyBatch;
            self.record(operation, Err(&err));
            return Err(err);
        }
        self.metrics.batch_size.observe(batch.len() as f64);
        let timer = self
            .metrics
            .transaction_duration_seconds
            .with_label_values(&[operation.as_str()])
            .start_timer();

        let mut attempt = 1;
        let result = loop {
            match self.run_once(operation, batch).await {
                Err(AdjustmentError::Store(fault)) if fault.is_retryable() && attempt < self.max_attempts => {
                    warn!(operation = operation.as_str(), attempt, error = %fault, "transaction aborted by store; retrying");
                    self.metrics.transaction_retries.inc();
                    attempt += 1;
                }
                other => break other,
            }
        };
        timer.observe_duration();

        match &result {
            Ok(receipt) => debug!(operation = operation.as_str(), attempt, lines = receipt.lines.len(), "committed"),
            Err(AdjustmentError::Store(fault)) => {
                if matches!(fault, StoreFault::LockTimeout { .. }) {
                    self.metrics.lock_wait_timeouts.inc();
                }
                error!(operation = operation.as_str(), attempt, error = ?fault, "rolled back after store error");
            }
            Err(err) => debug!(operation = operation.as_str(), error = %err, "rolled back"),
        }
        self.record(operation, result.as_ref());
        result
    }

    /// One transaction: begin, lock and check every item, mutate, commit.
    /// Any failure rolls back before the handle is released.
    async fn run_once(&self, operation: StockOperation, batch: &NormalizedBatch) -> Result<AdjustmentReceipt, AdjustmentError> {
        let mut tx = self.store.begin().await?;
        match check_and_mutate(tx.as_mut(), operation, batch).await {
            Ok(receipt) => {
                tx.commit().await?;
                Ok(receipt)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(operation = operation.as_str(), error = ?rollback_err, "rollback failed; transaction released");
                }
                Err(err)
            }
        }
    }

    fn record(&self, operation: StockOperation, result: Result<&AdjustmentReceipt, &AdjustmentError>) {
        let outcome = match result {
            Ok(_) => "success",
            Err(err) => err.kind().as_str(),
        };
        self.metrics
            .adjustments_total
            .with_label_values(&[operation.as_str(), outcome])
            .inc();
    }
}

/// Locks every row in ascending product order and validates it; only when all rows
/// pass are the deltas applied. Locks stay held until the caller commits or rolls back.
async fn check_and_mutate(
    tx: &mut dyn StockTransaction,
    operation: StockOperation,
    batch: &NormalizedBatch,
) -> Result<AdjustmentReceipt, AdjustmentError> {
    let mut checked = Vec::with_capacity(batch.len());
    for item in batch.iter() {
        let record = tx
            .lock_record(item.product_id)
            .await?
            .ok_or(AdjustmentError::NotFound { product_id: item.product_id })?;
        if operation == StockOperation::Decrement && record.stock_quantity < item.quantity {
            return Err(AdjustmentError::InsufficientStock {
                product_id: item.product_id,
                available: record.stock_quantity,
                requested: item.quantity,
            });
        }
        checked.push((item, record));
    }

    let mut lines = Vec::with_capacity(checked.len());
    for (item, record) in checked {
        let delta = match operation {
            StockOperation::Decrement => -item.quantity,
            StockOperation::Restore => item.quantity,
        };
        let stock_after = tx.apply_delta(item.product_id, delta).await?;
        lines.push(AdjustedLine {
            product_id: item.product_id,
            quantity: item.quantity,
            stock_before: record.stock_quantity,
            stock_after,
        });
    }
    Ok(AdjustmentReceipt { operation, lines })
}
