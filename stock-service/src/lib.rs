pub mod app;
pub mod config;
pub mod controller;
pub mod line_items;
pub mod outcome;
pub mod stock_handlers;
pub mod store;

pub use crate::controller::StockController;
pub use crate::line_items::{normalize, LineItem, NormalizedBatch, ProductId, RawLineItem, ValidationError};
pub use crate::outcome::{AdjustmentError, AdjustmentFailure, AdjustmentOutcome, AdjustmentReceipt, FailureKind, StockOperation};
pub use crate::stock_handlers::*;

use common_observability::StockMetrics;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
	pub controller: Arc<StockController>,
	pub metrics: Arc<StockMetrics>,
}

impl AppState {
	pub fn new(controller: StockController) -> Self {
		let metrics = controller.metrics().clone();
		Self { controller: Arc::new(controller), metrics }
	}
}
