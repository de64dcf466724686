// tests/postgres_store_tests.rs
//
// Runs against a scratch Postgres database:
//   DATABASE_URL=postgres://... cargo test --test postgres_store_tests -- --ignored
mod common;

use chrono::Duration;
use common::*;
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;
use storefront::config::AppConfig;
use storefront::db::{CompletionOutcome, PgStore};
use storefront::models::{PaymentStatus, TransactionStatus};
use storefront::pipelines::checkout_pipeline::{place_order, CheckoutReceipt};
use storefront::pipelines::reconcile_pipeline::check_payment_status;
use storefront::services::clock::{Clock, ManualClock};
use storefront::services::payment_sandbox::SandboxGateway;
use storefront::services::stock_ledger::{LedgerError, StockCommit, StockLine};
use storefront::state::{AppState, StoreHandles};
use uuid::Uuid;

struct PgHarness {
  state: AppState,
  sandbox: Arc<SandboxGateway>,
  clock: Arc<ManualClock>,
}

async fn pg_harness() -> PgHarness {
  setup_tracing();
  let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a scratch database");
  let store = PgStore::connect(&url).await.unwrap();
  store.run_migrations().await.unwrap();

  let config = AppConfig::local_defaults();
  let clock = Arc::new(ManualClock::new(start_time()));
  let sandbox = Arc::new(SandboxGateway::new(config.qr_ttl()));
  let state = AppState::with_sandbox(StoreHandles::from_postgres(store), sandbox.clone(), clock.clone(), config);
  PgHarness { state, sandbox, clock }
}

async fn seed_variant(h: &PgHarness, quantity: i32) -> Uuid {
  let variant = Uuid::new_v4();
  h.state.stock.restock(variant, quantity).await.unwrap();
  variant
}

async fn stock_of(h: &PgHarness, variant: Uuid) -> Option<i32> {
  h.state.stock.quantities(&[variant]).await.unwrap().get(&variant).copied()
}

async fn place(h: &PgHarness, variant: Uuid, quantity: i32) -> CheckoutReceipt {
  place_order(
    &h.state,
    Some(Uuid::new_v4()),
    checkout_request(vec![line(variant, quantity, 1500)]),
  )
  .await
  .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
#[ignore = "needs DATABASE_URL"]
async fn test_pg_concurrent_polls_claim_and_decrement_once() {
  let h = pg_harness().await;
  let variant = seed_variant(&h, 5).await;
  let receipt = place(&h, variant, 2).await;
  h.sandbox.settle(&receipt.payment_data.settlement_hash);

  let mut tasks = Vec::new();
  for _ in 0..8 {
    let state = h.state.clone();
    let txn_id = receipt.payment_data.transaction_id;
    tasks.push(tokio::spawn(async move { check_payment_status(&state, txn_id).await }));
  }
  for task in tasks {
    assert_eq!(task.await.unwrap().unwrap().status, TransactionStatus::Completed);
  }

  let order = h.state.orders.get_order(receipt.order.id).await.unwrap().unwrap();
  assert_eq!(order.payment_status, PaymentStatus::Paid);
  assert_eq!(stock_of(&h, variant).await, Some(3));
}

#[tokio::test]
#[serial]
#[ignore = "needs DATABASE_URL"]
async fn test_pg_only_one_transaction_per_order_completes() {
  let h = pg_harness().await;
  let variant = seed_variant(&h, 5).await;
  let receipt = place(&h, variant, 1).await;
  let first = h
    .state
    .payments
    .get_transaction(receipt.payment_data.transaction_id)
    .await
    .unwrap()
    .unwrap();

  let mut second = first.clone();
  second.id = Uuid::new_v4();
  second.settlement_hash = format!("{}-renewed", first.settlement_hash);
  h.state.payments.insert_transaction(&second).await.unwrap();

  let now = h.clock.now();
  assert_eq!(
    h.state.payments.complete_transaction(first.id, now, json!({})).await.unwrap(),
    CompletionOutcome::Completed
  );
  assert_eq!(
    h.state.payments.complete_transaction(first.id, now, json!({})).await.unwrap(),
    CompletionOutcome::NotInitiated
  );
  assert_eq!(
    h.state.payments.complete_transaction(second.id, now, json!({})).await.unwrap(),
    CompletionOutcome::OrderAlreadySettled
  );
}

#[tokio::test]
#[serial]
#[ignore = "needs DATABASE_URL"]
async fn test_pg_claim_refuses_an_expired_transaction() {
  let h = pg_harness().await;
  let variant = seed_variant(&h, 5).await;
  let receipt = place(&h, variant, 1).await;

  h.clock.advance(Duration::seconds(180));
  let outcome = h
    .state
    .payments
    .complete_transaction(receipt.payment_data.transaction_id, h.clock.now(), json!({}))
    .await
    .unwrap();
  assert_eq!(outcome, CompletionOutcome::Expired);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
#[ignore = "needs DATABASE_URL"]
async fn test_pg_concurrent_decrements_never_oversell() {
  let h = pg_harness().await;
  let a = seed_variant(&h, 10).await;
  let b = seed_variant(&h, 10).await;

  // Opposite line orders in alternate tasks exercise the row lock ordering.
  let mut tasks = Vec::new();
  for i in 0..24 {
    let stock = h.state.stock.clone();
    let lines = if i % 2 == 0 {
      vec![StockLine { variant_id: a, quantity: 1 }, StockLine { variant_id: b, quantity: 1 }]
    } else {
      vec![StockLine { variant_id: b, quantity: 1 }, StockLine { variant_id: a, quantity: 1 }]
    };
    tasks.push(tokio::spawn(async move { stock.decrement(&lines).await }));
  }
  let mut succeeded = 0;
  for task in tasks {
    match task.await.unwrap() {
      Ok(()) => succeeded += 1,
      Err(LedgerError::InsufficientStock(_)) => {}
      Err(other) => panic!("unexpected ledger error: {}", other),
    }
  }

  assert_eq!(succeeded, 10);
  assert_eq!(stock_of(&h, a).await, Some(0));
  assert_eq!(stock_of(&h, b).await, Some(0));
}

#[tokio::test]
#[serial]
#[ignore = "needs DATABASE_URL"]
async fn test_pg_order_commit_applies_once() {
  let h = pg_harness().await;
  let variant = seed_variant(&h, 6).await;
  let receipt = place(&h, variant, 2).await;
  let lines = [StockLine { variant_id: variant, quantity: 2 }];

  let stock = &h.state.stock;
  assert_eq!(
    stock.commit_for_order(receipt.order.id, &lines).await.unwrap(),
    StockCommit::Committed
  );
  assert_eq!(
    stock.commit_for_order(receipt.order.id, &lines).await.unwrap(),
    StockCommit::AlreadyCommitted
  );
  assert_eq!(stock_of(&h, variant).await, Some(4));
}
