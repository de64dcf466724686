// tests/renewal_and_status_tests.rs
mod common;

use chrono::Duration;
use common::*;
use serial_test::serial;
use storefront::errors::AppError;
use storefront::models::{OrderStatus, TransactionStatus};
use storefront::pipelines::order_status::advance_order_status;
use storefront::pipelines::reconcile_pipeline::check_payment_status;
use storefront::pipelines::renew_payment_pipeline::renew_payment;
use uuid::Uuid;

#[tokio::test]
#[serial]
async fn test_renewal_reuses_a_live_instrument() {
  setup_tracing();
  let h = harness();
  let customer = Uuid::new_v4();
  let (_, receipt) = place_simple_order(&h, customer, 5, 1).await;

  h.clock.advance(Duration::seconds(60));
  let renewed = renew_payment(&h.state, receipt.order.id, customer).await.unwrap();
  assert_eq!(renewed.transaction_id, receipt.payment_data.transaction_id);
  assert_eq!(h.store.transaction_count(), 1);
}

#[tokio::test]
#[serial]
async fn test_renewal_after_expiry_issues_a_new_instrument() {
  setup_tracing();
  let h = harness();
  let customer = Uuid::new_v4();
  let (variant, receipt) = place_simple_order(&h, customer, 5, 1).await;

  h.clock.advance(Duration::minutes(10));
  let renewed = renew_payment(&h.state, receipt.order.id, customer).await.unwrap();
  assert_ne!(renewed.transaction_id, receipt.payment_data.transaction_id);
  assert_ne!(renewed.settlement_hash, receipt.payment_data.settlement_hash);
  assert_eq!(renewed.expires_at, h.now() + Duration::seconds(180));

  let old = h
    .state
    .payments
    .get_transaction(receipt.payment_data.transaction_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(old.status, TransactionStatus::Expired);

  h.sandbox.settle(&renewed.settlement_hash);
  let txn = check_payment_status(&h.state, renewed.transaction_id).await.unwrap();
  assert_eq!(txn.status, TransactionStatus::Completed);
  assert_eq!(h.store.stock_of(variant), Some(4));
}

#[tokio::test]
#[serial]
async fn test_renewal_refuses_paid_and_foreign_orders() {
  setup_tracing();
  let h = harness();
  let customer = Uuid::new_v4();
  let (_, receipt) = place_simple_order(&h, customer, 5, 1).await;

  let err = renew_payment(&h.state, receipt.order.id, Uuid::new_v4()).await.unwrap_err();
  assert!(matches!(err, AppError::NotFound(_)));

  h.sandbox.settle(&receipt.payment_data.settlement_hash);
  check_payment_status(&h.state, receipt.payment_data.transaction_id)
    .await
    .unwrap();
  let err = renew_payment(&h.state, receipt.order.id, customer).await.unwrap_err();
  assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
#[serial]
async fn test_renewal_refuses_cancelled_orders() {
  setup_tracing();
  let h = harness();
  let customer = Uuid::new_v4();
  let (_, receipt) = place_simple_order(&h, customer, 5, 1).await;
  advance_order_status(&h.state, receipt.order.id, OrderStatus::Cancelled, "admin:test", None)
    .await
    .unwrap();

  h.clock.advance(Duration::minutes(5));
  let err = renew_payment(&h.state, receipt.order.id, customer).await.unwrap_err();
  assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
#[serial]
async fn test_status_moves_forward_and_is_journaled() {
  setup_tracing();
  let h = harness();
  let (_, receipt) = place_simple_order(&h, Uuid::new_v4(), 5, 1).await;
  let order_id = receipt.order.id;

  let order = advance_order_status(&h.state, order_id, OrderStatus::Confirmed, "admin:test", Some("Packed"))
    .await
    .unwrap();
  assert_eq!(order.status, OrderStatus::Confirmed);
  advance_order_status(&h.state, order_id, OrderStatus::Shipped, "admin:test", None)
    .await
    .unwrap();

  let history = h.state.journal.history(order_id).await.unwrap();
  let last = history.last().unwrap();
  assert_eq!(last.status, OrderStatus::Shipped);
  assert_eq!(last.note, "Status changed from CONFIRMED to SHIPPED");
  assert_eq!(last.actor.as_deref(), Some("admin:test"));
  assert!(history.iter().any(|e| e.note == "Packed"));
}

#[tokio::test]
#[serial]
async fn test_illegal_transitions_are_rejected() {
  setup_tracing();
  let h = harness();
  let (_, receipt) = place_simple_order(&h, Uuid::new_v4(), 5, 1).await;
  let order_id = receipt.order.id;

  let err = advance_order_status(&h.state, order_id, OrderStatus::Delivered, "admin:test", None)
    .await
    .unwrap_err();
  assert!(matches!(err, AppError::Validation(_)));

  advance_order_status(&h.state, order_id, OrderStatus::Cancelled, "admin:test", None)
    .await
    .unwrap();
  let err = advance_order_status(&h.state, order_id, OrderStatus::Confirmed, "admin:test", None)
    .await
    .unwrap_err();
  assert!(matches!(err, AppError::Validation(_)));

  let err = advance_order_status(&h.state, Uuid::new_v4(), OrderStatus::Confirmed, "admin:test", None)
    .await
    .unwrap_err();
  assert!(matches!(err, AppError::NotFound(_)));
}
