// tests/reconciliation_tests.rs
mod common;

use chrono::Duration;
use common::*;
use serial_test::serial;
use storefront::config::AppConfig;
use storefront::db::FaultPoint;
use storefront::errors::AppError;
use storefront::models::{Effect, EffectState, OrderStatus, PaymentStatus, TransactionStatus};
use storefront::pipelines::checkout_pipeline::place_order;
use storefront::pipelines::reconcile_pipeline::{check_payment_status, reconcile_by_hash};
use storefront::pipelines::settlement_effects::recover_pending_settlements;
use storefront::services::settlement_worker::{drain, DrainReport};
use uuid::Uuid;

#[tokio::test]
#[serial]
async fn test_settle_then_poll_five_times_decrements_once() {
  setup_tracing();
  let h = harness();
  let customer = Uuid::new_v4();
  let (variant, receipt) = place_simple_order(&h, customer, 5, 2).await;
  h.state
    .carts
    .set_quantity(customer, variant, 2, None, h.now())
    .await
    .unwrap();

  h.sandbox.settle(&receipt.payment_data.settlement_hash);
  for _ in 0..5 {
    let txn = check_payment_status(&h.state, receipt.payment_data.transaction_id)
      .await
      .unwrap();
    assert_eq!(txn.status, TransactionStatus::Completed);
  }

  assert_eq!(h.store.successful_decrements(), 1);
  assert_eq!(h.store.stock_of(variant), Some(3));
  // Terminal transactions are not re-queried.
  assert_eq!(h.sandbox.query_count(), 1);

  let order = h.state.orders.get_order(receipt.order.id).await.unwrap().unwrap();
  assert_eq!(order.payment_status, PaymentStatus::Paid);
  assert_eq!(order.paid_at, Some(start_time()));
  assert_eq!(order.status, OrderStatus::Pending);
  assert!(order.effects.all_settled());
  assert!(h.state.carts.list_cart(customer).await.unwrap().is_empty());

  let notes: Vec<String> = h
    .state
    .journal
    .history(order.id)
    .await
    .unwrap()
    .into_iter()
    .map(|e| e.note)
    .collect();
  assert_eq!(notes, vec!["Order has been placed", "Payment received"]);
}

#[tokio::test]
#[serial]
async fn test_late_settlement_after_expiry_is_not_honoured() {
  setup_tracing();
  let h = harness();
  let (variant, receipt) = place_simple_order(&h, Uuid::new_v4(), 5, 1).await;

  h.clock.advance(Duration::seconds(181));
  h.sandbox.settle(&receipt.payment_data.settlement_hash);
  let txn = check_payment_status(&h.state, receipt.payment_data.transaction_id)
    .await
    .unwrap();

  assert_eq!(txn.status, TransactionStatus::Expired);
  assert_eq!(h.store.stock_of(variant), Some(5));
  let order = h.state.orders.get_order(receipt.order.id).await.unwrap().unwrap();
  assert_eq!(order.payment_status, PaymentStatus::Pending);

  // Expired stays expired.
  let again = check_payment_status(&h.state, txn.id).await.unwrap();
  assert_eq!(again.status, TransactionStatus::Expired);
}

#[tokio::test]
#[serial]
async fn test_unsettled_poll_just_before_expiry_stays_initiated() {
  setup_tracing();
  let h = harness();
  let (_, receipt) = place_simple_order(&h, Uuid::new_v4(), 5, 1).await;

  h.clock.advance(Duration::seconds(179));
  let txn = check_payment_status(&h.state, receipt.payment_data.transaction_id)
    .await
    .unwrap();
  assert_eq!(txn.status, TransactionStatus::Initiated);

  h.clock.advance(Duration::seconds(1));
  let txn = check_payment_status(&h.state, txn.id).await.unwrap();
  assert_eq!(txn.status, TransactionStatus::Expired);
}

#[tokio::test]
#[serial]
async fn test_unreachable_gateway_leaves_transaction_initiated() {
  setup_tracing();
  let h = harness();
  let (_, receipt) = place_simple_order(&h, Uuid::new_v4(), 5, 1).await;
  h.sandbox.settle(&receipt.payment_data.settlement_hash);
  h.sandbox.set_unreachable(true);

  let txn = check_payment_status(&h.state, receipt.payment_data.transaction_id)
    .await
    .unwrap();
  assert_eq!(txn.status, TransactionStatus::Initiated);

  h.sandbox.set_unreachable(false);
  let txn = check_payment_status(&h.state, txn.id).await.unwrap();
  assert_eq!(txn.status, TransactionStatus::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_concurrent_polls_apply_effects_once() {
  setup_tracing();
  let h = harness();
  let (variant, receipt) = place_simple_order(&h, Uuid::new_v4(), 10, 3).await;
  h.sandbox.settle(&receipt.payment_data.settlement_hash);

  let mut tasks = Vec::new();
  for _ in 0..8 {
    let state = h.state.clone();
    let txn_id = receipt.payment_data.transaction_id;
    tasks.push(tokio::spawn(async move { check_payment_status(&state, txn_id).await }));
  }
  for task in tasks {
    let txn = task.await.unwrap().unwrap();
    assert_eq!(txn.status, TransactionStatus::Completed);
  }

  assert_eq!(h.store.successful_decrements(), 1);
  assert_eq!(h.store.stock_of(variant), Some(7));
}

#[tokio::test]
#[serial]
async fn test_webhook_and_poll_share_one_settlement() {
  setup_tracing();
  let h = harness();
  let (variant, receipt) = place_simple_order(&h, Uuid::new_v4(), 4, 1).await;
  h.sandbox.settle(&receipt.payment_data.settlement_hash);

  let via_webhook = reconcile_by_hash(&h.state, &receipt.payment_data.settlement_hash)
    .await
    .unwrap();
  assert_eq!(via_webhook.status, TransactionStatus::Completed);
  let replayed = reconcile_by_hash(&h.state, &receipt.payment_data.settlement_hash)
    .await
    .unwrap();
  assert_eq!(replayed.status, TransactionStatus::Completed);
  let via_poll = check_payment_status(&h.state, via_webhook.id).await.unwrap();
  assert_eq!(via_poll.status, TransactionStatus::Completed);

  assert_eq!(h.store.stock_of(variant), Some(3));
  assert_eq!(h.store.successful_decrements(), 1);

  let err = reconcile_by_hash(&h.state, "not-a-known-hash").await.unwrap_err();
  assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
#[serial]
async fn test_failed_effect_is_retried_without_failing_the_poll() {
  setup_tracing();
  let h = harness();
  let customer = Uuid::new_v4();
  let (variant, receipt) = place_simple_order(&h, customer, 5, 1).await;
  h.state
    .carts
    .set_quantity(customer, variant, 1, None, h.now())
    .await
    .unwrap();
  h.store.fail_next(FaultPoint::ClearCart, 1);
  h.sandbox.settle(&receipt.payment_data.settlement_hash);

  let txn = check_payment_status(&h.state, receipt.payment_data.transaction_id)
    .await
    .unwrap();
  assert_eq!(txn.status, TransactionStatus::Completed);

  let order = h.state.orders.get_order(receipt.order.id).await.unwrap().unwrap();
  assert_eq!(order.payment_status, PaymentStatus::Paid);
  assert_eq!(order.effects.get(Effect::ClearCart), EffectState::Pending);
  assert_eq!(order.effects.get(Effect::CommitStock), EffectState::Applied);
  assert_eq!(h.state.carts.list_cart(customer).await.unwrap().len(), 1);

  let report = drain(&h.state).await;
  assert_eq!(
    report,
    DrainReport {
      settled: 1,
      requeued: 0,
      exhausted: 0
    }
  );
  assert!(h.state.carts.list_cart(customer).await.unwrap().is_empty());
  let order = h.state.orders.get_order(receipt.order.id).await.unwrap().unwrap();
  assert!(order.effects.all_settled());
}

#[tokio::test]
#[serial]
async fn test_exhausted_retries_are_picked_up_by_recovery_sweep() {
  setup_tracing();
  let mut config = AppConfig::local_defaults();
  config.settlement_retry_max_attempts = 2;
  let h = harness_with(config);
  let customer = Uuid::new_v4();
  let (variant, receipt) = place_simple_order(&h, customer, 5, 1).await;
  h.state
    .carts
    .set_quantity(customer, variant, 1, None, h.now())
    .await
    .unwrap();
  // Inline attempt, retry 1 and retry 2 all fail.
  h.store.fail_next(FaultPoint::ClearCart, 3);
  h.sandbox.settle(&receipt.payment_data.settlement_hash);

  check_payment_status(&h.state, receipt.payment_data.transaction_id)
    .await
    .unwrap();
  assert_eq!(drain(&h.state).await.requeued, 1);
  assert_eq!(drain(&h.state).await.exhausted, 1);
  assert_eq!(drain(&h.state).await, DrainReport::default());

  let order = h.state.orders.get_order(receipt.order.id).await.unwrap().unwrap();
  assert_eq!(order.effects.get(Effect::ClearCart), EffectState::Pending);

  assert_eq!(recover_pending_settlements(&h.state).await.unwrap(), 1);
  assert_eq!(drain(&h.state).await.settled, 1);
  assert!(h.state.carts.list_cart(customer).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn test_restart_converges_after_crash_between_claim_and_effects() {
  setup_tracing();
  let h = harness();
  let (variant, receipt) = place_simple_order(&h, Uuid::new_v4(), 5, 2).await;
  // Every effect runs but none gets its marker recorded, as if the process
  // died right after each write.
  h.store.fail_next(FaultPoint::SetEffectState, 4);
  h.sandbox.settle(&receipt.payment_data.settlement_hash);
  check_payment_status(&h.state, receipt.payment_data.transaction_id)
    .await
    .unwrap();
  let order = h.state.orders.get_order(receipt.order.id).await.unwrap().unwrap();
  assert_eq!(order.effects.pending().len(), 4);

  let restarted = h.restart();
  assert_eq!(recover_pending_settlements(&restarted).await.unwrap(), 4);
  assert_eq!(drain(&restarted).await.settled, 4);

  let order = restarted.orders.get_order(receipt.order.id).await.unwrap().unwrap();
  assert!(order.effects.all_settled());
  assert_eq!(order.payment_status, PaymentStatus::Paid);
  assert_eq!(h.store.successful_decrements(), 1);
  assert_eq!(h.store.stock_of(variant), Some(3));
  assert_eq!(recover_pending_settlements(&restarted).await.unwrap(), 0);
}

#[tokio::test]
#[serial]
async fn test_oversell_after_payment_is_escalated_not_retried() {
  setup_tracing();
  let h = harness();
  let variant = h.store.seed_variant(1);
  let first = place_order(&h.state, Some(Uuid::new_v4()), checkout_request(vec![line(variant, 1, 3000)]))
    .await
    .unwrap();
  let second = place_order(&h.state, Some(Uuid::new_v4()), checkout_request(vec![line(variant, 1, 3000)]))
    .await
    .unwrap();

  for receipt in [&first, &second] {
    h.sandbox.settle(&receipt.payment_data.settlement_hash);
    let txn = check_payment_status(&h.state, receipt.payment_data.transaction_id)
      .await
      .unwrap();
    assert_eq!(txn.status, TransactionStatus::Completed);
  }

  assert_eq!(h.store.stock_of(variant), Some(0));
  let order = h.state.orders.get_order(second.order.id).await.unwrap().unwrap();
  assert_eq!(order.payment_status, PaymentStatus::Paid);
  assert_eq!(order.effects.get(Effect::CommitStock), EffectState::Escalated);
  assert!(order.effects.all_settled());
  assert_eq!(drain(&h.state).await, DrainReport::default());

  let history = h.state.journal.history(order.id).await.unwrap();
  assert!(history.iter().any(|e| e.note.contains("oversell")));
}

#[tokio::test]
#[serial]
async fn test_second_settlement_for_paid_order_is_failed_and_flagged() {
  setup_tracing();
  let h = harness();
  let (variant, receipt) = place_simple_order(&h, Uuid::new_v4(), 5, 1).await;

  let original = h
    .state
    .payments
    .get_transaction(receipt.payment_data.transaction_id)
    .await
    .unwrap()
    .unwrap();
  let mut duplicate = original.clone();
  duplicate.id = Uuid::new_v4();
  duplicate.settlement_hash = format!("{}-dup", original.settlement_hash);
  h.state.payments.insert_transaction(&duplicate).await.unwrap();

  h.sandbox.settle(&original.settlement_hash);
  h.sandbox.settle(&duplicate.settlement_hash);
  let first = check_payment_status(&h.state, original.id).await.unwrap();
  let second = check_payment_status(&h.state, duplicate.id).await.unwrap();

  assert_eq!(first.status, TransactionStatus::Completed);
  assert_eq!(second.status, TransactionStatus::Failed);
  assert!(second.gateway_response.is_some());
  assert_eq!(h.store.successful_decrements(), 1);
  assert_eq!(h.store.stock_of(variant), Some(4));

  let history = h.state.journal.history(receipt.order.id).await.unwrap();
  assert!(history.iter().any(|e| e.note.contains("refund required")));
}

#[tokio::test]
#[serial]
async fn test_unknown_transaction_is_not_found() {
  setup_tracing();
  let h = harness();
  let err = check_payment_status(&h.state, Uuid::new_v4()).await.unwrap_err();
  assert!(matches!(err, AppError::NotFound(_)));
}
