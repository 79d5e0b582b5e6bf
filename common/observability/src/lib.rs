use prometheus::{Histogram, HistogramVec, IntCounter, IntCounterVec, Registry};

#[derive(Clone)]
pub struct StockMetrics {
    pub registry: Registry,
    pub adjustments_total: IntCounterVec,
    pub transaction_duration_seconds: HistogramVec,
    pub transaction_retries: IntCounter,
    pub compensation_failures: IntCounter,
    pub lock_wait_timeouts: IntCounter,
    pub batch_size: Histogram,
    pub http_errors_total: IntCounterVec,
}

impl StockMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let adjustments_total = IntCounterVec::new(
            prometheus::Opts::new(
                "stock_adjustments_total",
                "Stock adjustment batches by operation and outcome kind",
            ),
            &["operation", "outcome"],
        ).unwrap();
        let transaction_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "stock_transaction_duration_seconds",
                "Wall time of one stock adjustment transaction, lock waits included",
            ).buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["operation"],
        ).unwrap();
        let transaction_retries = IntCounter::new(
            "stock_transaction_retries_total",
            "Transactions restarted after a deadlock or serialization failure",
        ).unwrap();
        let compensation_failures = IntCounter::new(
            "stock_compensation_failures_total",
            "Compensating restores that failed and left stock decremented",
        ).unwrap();
        let lock_wait_timeouts = IntCounter::new(
            "stock_lock_wait_timeouts_total",
            "Transactions aborted because a row lock was not granted in time",
        ).unwrap();
        let batch_size = Histogram::with_opts(
            prometheus::HistogramOpts::new(
                "stock_batch_size",
                "Distinct products per normalized batch"
            ).buckets(vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0])
        ).unwrap();
        let http_errors_total = IntCounterVec::new(
            prometheus::Opts::new(
                "http_errors_total",
                "Count of HTTP error responses emitted (status >= 400)"
            ),
            &["service", "code", "status"]
        ).unwrap();
        let _ = registry.register(Box::new(adjustments_total.clone()));
        let _ = registry.register(Box::new(transaction_duration_seconds.clone()));
        let _ = registry.register(Box::new(transaction_retries.clone()));
        let _ = registry.register(Box::new(compensation_failures.clone()));
        let _ = registry.register(Box::new(lock_wait_timeouts.clone()));
        let _ = registry.register(Box::new(batch_size.clone()));
        let _ = registry.register(Box::new(http_errors_total.clone()));
        StockMetrics {
            registry,
            adjustments_total,
            transaction_duration_seconds,
            transaction_retries,
            compensation_failures,
            lock_wait_timeouts,
            batch_size,
            http_errors_total,
        }
    }
}

impl Default for StockMetrics {
    fn default() -> Self { Self::new() }
}
