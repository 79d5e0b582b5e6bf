//! Adjustment results and their mapping to caller-facing errors.

use crate::line_items::{ProductId, ValidationError};
use crate::store::StoreFault;
use common_http_errors::ApiError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockOperation {
    Decrement,
    Restore,
}

impl StockOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockOperation::Decrement => "decrement",
            StockOperation::Restore => "restore",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdjustedLine {
    pub product_id: ProductId,
    pub quantity: i64,
    pub stock_before: i64,
    pub stock_after: i64,
}

/// Committed result of one batch, lines in ascending product order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdjustmentReceipt {
    pub operation: StockOperation,
    pub lines: Vec<AdjustedLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdjustmentError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("batch contains no items")]
    EmptyBatch,
    #[error("product {product_id} does not exist")]
    NotFound { product_id: ProductId },
    #[error("insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock { product_id: ProductId, available: i64, requested: i64 },
    #[error("inventory store error: {0}")]
    Store(#[from] StoreFault),
    #[error("downstream step failed and stock was restored: {reason}")]
    DownstreamFailed { reason: String },
    #[error("downstream step failed ({reason}) and the compensating restore failed: {restore}")]
    CompensationFailed { reason: String, restore: Box<AdjustmentError> },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ValidationError,
    EmptyBatch,
    NotFound,
    InsufficientStock,
    StoreError,
    DownstreamFailed,
    CompensationFailed,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ValidationError => "validation_error",
            FailureKind::EmptyBatch => "empty_batch",
            FailureKind::NotFound => "not_found",
            FailureKind::InsufficientStock => "insufficient_stock",
            FailureKind::StoreError => "store_error",
            FailureKind::DownstreamFailed => "downstream_failed",
            FailureKind::CompensationFailed => "compensation_failed",
        }
    }
}

impl AdjustmentError {
    pub fn kind(&self) -> FailureKind {
        match self {
            AdjustmentError::Validation(_) => FailureKind::ValidationError,
            AdjustmentError::EmptyBatch => FailureKind::EmptyBatch,
            AdjustmentError::NotFound { .. } => FailureKind::NotFound,
            AdjustmentError::InsufficientStock { .. } => FailureKind::InsufficientStock,
            AdjustmentError::Store(_) => FailureKind::StoreError,
            AdjustmentError::DownstreamFailed { .. } => FailureKind::DownstreamFailed,
            AdjustmentError::CompensationFailed { .. } => FailureKind::CompensationFailed,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FailureDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdjustmentFailure {
    pub kind: FailureKind,
    pub operation: StockOperation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<ProductId>,
    pub message: String,
    pub details: FailureDetails,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdjustmentOutcome {
    Success(AdjustmentReceipt),
    Failure(AdjustmentFailure),
}

impl AdjustmentOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AdjustmentOutcome::Success(_))
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            AdjustmentOutcome::Success(_) => None,
            AdjustmentOutcome::Failure(f) => Some(f.kind),
        }
    }
}

/// Builds the caller-facing outcome. Store faults are reduced to their class;
/// the fault text stays in the logs.
pub fn report(operation: StockOperation, result: Result<AdjustmentReceipt, AdjustmentError>) -> AdjustmentOutcome {
    let err = match result {
        Ok(receipt) => return AdjustmentOutcome::Success(receipt),
        Err(err) => err,
    };
    let kind = err.kind();
    let mut details = FailureDetails::default();
    let mut product_id = None;
    let message = match &err {
        AdjustmentError::Validation(v) => {
            details.reason = Some(v.code());
            match v {
                ValidationError::InvalidProductId { index } | ValidationError::InvalidQuantity { index } => {
                    details.item_index = Some(*index);
                }
                ValidationError::QuantityOverflow { product_id: id } => product_id = Some(*id),
            }
            v.to_string()
        }
        AdjustmentError::EmptyBatch => "Batch must include at least one item".to_string(),
        AdjustmentError::NotFound { product_id: id } => {
            product_id = Some(*id);
            format!("Product {id} does not exist")
        }
        AdjustmentError::InsufficientStock { product_id: id, available, requested } => {
            product_id = Some(*id);
            details.available = Some(*available);
            details.requested = Some(*requested);
            format!("Insufficient stock for product {id} (requested {requested}, available {available})")
        }
        AdjustmentError::Store(fault) => {
            details.fault = Some(fault.class());
            match operation {
                StockOperation::Decrement => "Stock adjustment failed; no changes were applied".to_string(),
                StockOperation::Restore => "Stock restore failed; no changes were applied".to_string(),
            }
        }
        AdjustmentError::DownstreamFailed { .. } => {
            "Downstream step failed; decremented stock was restored".to_string()
        }
        AdjustmentError::CompensationFailed { restore, .. } => {
            details.reason = Some(restore.kind().as_str());
            if let AdjustmentError::Store(fault) = restore.as_ref() {
                details.fault = Some(fault.class());
            }
            "Downstream step failed and stock could not be restored; operator attention required".to_string()
        }
    };
    AdjustmentOutcome::Failure(AdjustmentFailure { kind, operation, product_id, message, details })
}

impl From<AdjustmentFailure> for ApiError {
    fn from(f: AdjustmentFailure) -> Self {
        let code = f.kind.as_str();
        let details = Some(json!({
            "operation": f.operation,
            "product_id": f.product_id,
            "info": f.details,
        }));
        let message = Some(f.message);
        match f.kind {
            FailureKind::ValidationError | FailureKind::EmptyBatch => {
                ApiError::BadRequest { code, trace_id: None, message, details }
            }
            FailureKind::NotFound => ApiError::NotFound { code, trace_id: None, message, details },
            FailureKind::InsufficientStock => ApiError::Conflict { code, trace_id: None, message, details },
            FailureKind::StoreError | FailureKind::DownstreamFailed | FailureKind::CompensationFailed => {
                ApiError::Internal { code, trace_id: None, message, details }
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AdjustStockResponse {
    pub message: &'static str,
    pub operation: StockOperation,
    pub items: Vec<AdjustedLine>,
}

impl From<AdjustmentReceipt> for AdjustStockResponse {
    fn from(receipt: AdjustmentReceipt) -> Self {
        let message = match receipt.operation {
            StockOperation::Decrement => "Stock updated",
            StockOperation::Restore => "Stock restored",
        };
        Self { message, operation: receipt.operation, items: receipt.lines }
    }
}
