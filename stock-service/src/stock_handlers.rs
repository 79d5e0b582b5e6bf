use crate::line_items::RawLineItem;
use crate::outcome::{AdjustStockResponse, AdjustmentOutcome, FailureKind, StockOperation};
use crate::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use common_http_errors::ApiError;
use serde::Deserialize;
use uuid::Uuid;

/// Body of both stock endpoints. A missing or `null` `items` is an empty batch.
#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    #[serde(default)]
    pub items: Option<Vec<RawLineItem>>,
}

type StockPayload = Result<Json<AdjustStockRequest>, JsonRejection>;

pub async fn decrement_stock(
    State(state): State<AppState>,
    payload: StockPayload,
) -> Result<Json<AdjustStockResponse>, ApiError> {
    let items = request_items(StockOperation::Decrement, payload)?;
    adjust(&state, StockOperation::Decrement, &items).await
}

/// Compensating endpoint: called by the sale flow when recording the sale fails
/// after stock was decremented.
pub async fn restore_stock(
    State(state): State<AppState>,
    payload: StockPayload,
) -> Result<Json<AdjustStockResponse>, ApiError> {
    let items = request_items(StockOperation::Restore, payload)?;
    adjust(&state, StockOperation::Restore, &items).await
}

/// Bodies that are not a JSON object with an `items` array are validation
/// failures; the extractor's text stays in the logs.
fn request_items(operation: StockOperation, payload: StockPayload) -> Result<Vec<RawLineItem>, ApiError> {
    match payload {
        Ok(Json(request)) => Ok(request.items.unwrap_or_default()),
        Err(rejection) => {
            tracing::debug!(operation = operation.as_str(), error = %rejection.body_text(), "rejected stock request body");
            Err(ApiError::BadRequest {
                code: FailureKind::ValidationError.as_str(),
                trace_id: None,
                message: Some("Request body must be a JSON object with an items array".to_string()),
                details: Some(serde_json::json!({ "operation": operation })),
            })
        }
    }
}

async fn adjust(
    state: &AppState,
    operation: StockOperation,
    items: &[RawLineItem],
) -> Result<Json<AdjustStockResponse>, ApiError> {
    match state.controller.adjust_stock(operation, items).await {
        AdjustmentOutcome::Success(receipt) => Ok(Json(receipt.into())),
        AdjustmentOutcome::Failure(failure) => {
            let err = ApiError::from(failure);
            if err.status().is_server_error() {
                let trace_id = Uuid::new_v4();
                tracing::error!(%trace_id, operation = operation.as_str(), code = err.code(), "stock adjustment failed");
                return Err(err.with_trace_id(trace_id));
            }
            Err(err)
        }
    }
}
