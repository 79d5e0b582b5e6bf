
use stock_service::outcome::AdjustedLine;
use stock_service::store::{FaultPoint, StoreFault};
use stock_service::{normalize, AdjustmentError, AdjustmentOutcome, FailureKind, ProductId, StockOperation};
use test_utils::{items, seeded_controller};

const A: i64 = 1;
const B: i64 = 2;

#[tokio::test]
async fn decrement_success_updates_stock() {
    let (store, controller) = seeded_controller(&[(A, 5)]).await;
    let outcome = controller.adjust_stock(StockOperation::Decrement, &items(&[(A, 3)])).await;
    match outcome {
        AdjustmentOutcome::Success(receipt) => {
            assert_eq!(receipt.operation, StockOperation::Decrement);
            assert_eq!(
                receipt.lines,
                vec![AdjustedLine { product_id: ProductId(A), quantity: 3, stock_before: 5, stock_after: 2 }]
            );
        }
        other => panic!("expected success, got {other:?}"),
    }
    assert_eq!(store.stock_of(ProductId(A)).await, Some(2));
}

#[tokio::test]
async fn shortfall_on_one_item_leaves_every_item_untouched() {
    let (store, controller) = seeded_controller(&[(A, 5), (B, 5)]).await;
    let outcome = controller.adjust_stock(StockOperation::Decrement, &items(&[(A, 3), (B, 10)])).await;
    match outcome {
        AdjustmentOutcome::Failure(f) => {
            assert_eq!(f.kind, FailureKind::InsufficientStock);
            assert_eq!(f.product_id, Some(ProductId(B)));
            assert_eq!(f.details.available, Some(5));
            assert_eq!(f.details.requested, Some(10));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(store.stock_of(ProductId(A)).await, Some(5));
    assert_eq!(store.stock_of(ProductId(B)).await, Some(5));
}

#[tokio::test]
async fn duplicate_lines_are_checked_against_combined_quantity() {
    let (store, controller) = seeded_controller(&[(A, 5)]).await;
    let outcome = controller.adjust_stock(StockOperation::Decrement, &items(&[(A, 3), (A, 3)])).await;
    assert_eq!(outcome.failure_kind(), Some(FailureKind::InsufficientStock));
    assert_eq!(store.stock_of(ProductId(A)).await, Some(5));

    let outcome = controller.adjust_stock(StockOperation::Decrement, &items(&[(A, 2), (A, 3)])).await;
    assert!(outcome.is_success());
    assert_eq!(store.stock_of(ProductId(A)).await, Some(0));
}

#[tokio::test]
async fn restore_is_unconditional() {
    let (store, controller) = seeded_controller(&[(A, 0)]).await;
    let outcome = controller.adjust_stock(StockOperation::Restore, &items(&[(A, 3)])).await;
    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(store.stock_of(ProductId(A)).await, Some(3));
}

#[tokio::test]
async fn missing_product_fails_whole_batch() {
    let (store, controller) = seeded_controller(&[(A, 5)]).await;
    for op in [StockOperation::Decrement, StockOperation::Restore] {
        match controller.adjust_stock(op, &items(&[(A, 1), (99, 1)])).await {
            AdjustmentOutcome::Failure(f) => {
                assert_eq!(f.kind, FailureKind::NotFound);
                assert_eq!(f.operation, op);
                assert_eq!(f.product_id, Some(ProductId(99)));
            }
            other => panic!("expected not found, got {other:?}"),
        }
    }
    assert_eq!(store.stock_of(ProductId(A)).await, Some(5));
}

#[tokio::test]
async fn empty_and_invalid_batches_are_rejected_before_the_store() {
    let (store, controller) = seeded_controller(&[(A, 5)]).await;
    store.inject_fault(FaultPoint::Begin, StoreFault::Unavailable("should not be reached".into())).await;

    let outcome = controller.adjust_stock(StockOperation::Decrement, &[]).await;
    assert_eq!(outcome.failure_kind(), Some(FailureKind::EmptyBatch));

    let outcome = controller.adjust_stock(StockOperation::Decrement, &items(&[(A, 1), (B, 0)])).await;
    assert_eq!(outcome.failure_kind(), Some(FailureKind::ValidationError));

    // The injected fault is still pending, so no transaction was opened.
    let outcome = controller.adjust_stock(StockOperation::Decrement, &items(&[(A, 1)])).await;
    assert_eq!(outcome.failure_kind(), Some(FailureKind::StoreError));
    assert_eq!(store.stock_of(ProductId(A)).await, Some(5));
}

#[tokio::test]
async fn repeated_failure_reports_identically() {
    let (_store, controller) = seeded_controller(&[(A, 5), (B, 1)]).await;
    let batch = items(&[(A, 2), (B, 4)]);
    let first = controller.adjust_stock(StockOperation::Decrement, &batch).await;
    let second = controller.adjust_stock(StockOperation::Decrement, &batch).await;
    assert_eq!(first.failure_kind(), Some(FailureKind::InsufficientStock));
    assert_eq!(first, second);
}

#[tokio::test]
async fn store_fault_mid_mutation_rolls_back() {
    let (store, controller) = seeded_controller(&[(A, 5), (B, 5)]).await;
    store.inject_fault(FaultPoint::Apply, StoreFault::Constraint("check violated".into())).await;
    // First apply fails; nothing from the batch may be visible.
    let outcome = controller.adjust_stock(StockOperation::Decrement, &items(&[(A, 1), (B, 1)])).await;
    match outcome {
        AdjustmentOutcome::Failure(f) => {
            assert_eq!(f.kind, FailureKind::StoreError);
            assert_eq!(f.details.fault, Some("internal"));
        }
        other => panic!("expected store error, got {other:?}"),
    }
    assert_eq!(store.stock_of(ProductId(A)).await, Some(5));
    assert_eq!(store.stock_of(ProductId(B)).await, Some(5));
}

#[tokio::test]
async fn failed_commit_is_a_store_error() {
    let (store, controller) = seeded_controller(&[(A, 5)]).await;
    store.inject_fault(FaultPoint::Commit, StoreFault::Unavailable("connection reset".into())).await;
    let outcome = controller.adjust_stock(StockOperation::Restore, &items(&[(A, 1)])).await;
    match outcome {
        AdjustmentOutcome::Failure(f) => {
            assert_eq!(f.kind, FailureKind::StoreError);
            assert_eq!(f.operation, StockOperation::Restore);
            assert_eq!(f.details.fault, Some("unavailable"));
            assert!(!f.message.contains("connection reset"));
        }
        other => panic!("expected store error, got {other:?}"),
    }
    assert_eq!(store.stock_of(ProductId(A)).await, Some(5));
}

#[tokio::test]
async fn deadlock_victim_is_retried() {
    let (store, controller) = seeded_controller(&[(A, 5)]).await;
    store.inject_fault(FaultPoint::Lock, StoreFault::Deadlock).await;
    let outcome = controller.adjust_stock(StockOperation::Decrement, &items(&[(A, 2)])).await;
    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(store.stock_of(ProductId(A)).await, Some(3));
    assert_eq!(controller.metrics().transaction_retries.get(), 1);
}

#[tokio::test]
async fn retries_are_bounded() {
    let (store, controller) = seeded_controller(&[(A, 5)]).await;
    let controller = controller.with_max_attempts(2);
    for _ in 0..3 {
        store.inject_fault(FaultPoint::Begin, StoreFault::Serialization).await;
    }
    let batch = normalize(&items(&[(A, 2)])).unwrap();
    let err = controller.decrement(&batch).await.unwrap_err();
    assert_eq!(err, AdjustmentError::Store(StoreFault::Serialization));
    assert_eq!(controller.metrics().transaction_retries.get(), 1);
    assert_eq!(store.stock_of(ProductId(A)).await, Some(5));
}

#[tokio::test]
async fn outcomes_are_counted_by_kind() {
    let (_store, controller) = seeded_controller(&[(A, 1)]).await;
    controller.adjust_stock(StockOperation::Decrement, &items(&[(A, 1)])).await;
    controller.adjust_stock(StockOperation::Decrement, &items(&[(A, 1)])).await;
    controller.adjust_stock(StockOperation::Decrement, &items(&[(-1, 1)])).await;
    let counter = &controller.metrics().adjustments_total;
    assert_eq!(counter.with_label_values(&["decrement", "success"]).get(), 1);
    assert_eq!(counter.with_label_values(&["decrement", "insufficient_stock"]).get(), 1);
    assert_eq!(counter.with_label_values(&["decrement", "validation_error"]).get(), 1);
}
