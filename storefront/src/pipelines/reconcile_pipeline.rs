// storefront/src/pipelines/reconcile_pipeline.rs

//! Payment reconciliation, shared by client polling and gateway webhooks.
//!
//! Only the caller that wins the INITIATED -> COMPLETED claim runs the effect
//! steps. Those steps are best effort: a failure is queued for retry and the
//! caller still sees COMPLETED.

use crate::db::CompletionOutcome;
use crate::errors::{AppError, Result as AppResult};
use crate::models::{Effect, PaymentTransaction};
use crate::pipelines::contexts::ReconcileCtxData;
use crate::pipelines::settlement_effects::{flag_duplicate_settlement, run_effect};
use crate::state::AppState;
use seamline::{ContextData, Saga, SagaRegistry, SkipCondition, StepControl};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const STEP_LOAD: &str = "load_transaction";
pub const STEP_EXPIRY: &str = "enforce_expiry";
pub const STEP_QUERY: &str = "query_settlement";
pub const STEP_CLAIM: &str = "claim_settlement";
pub const STEP_MARK_PAID: &str = "mark_order_paid";
pub const STEP_COMMIT_STOCK: &str = "commit_stock";
pub const STEP_RECORD_COUPON: &str = "record_coupon_usage";
pub const STEP_CLEAR_CART: &str = "clear_cart";
pub const STEP_APPEND_HISTORY: &str = "append_payment_history";

async fn reload(app_state: &AppState, transaction_id: Uuid) -> AppResult<PaymentTransaction> {
  app_state
    .payments
    .get_transaction(transaction_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Payment transaction {} not found", transaction_id)))
}

async fn load_transaction(ctx: ContextData<ReconcileCtxData>) -> AppResult<StepControl> {
  let (app_state, transaction_id) = {
    let guard = ctx.read();
    (guard.app_state.clone(), guard.transaction_id)
  };
  let txn = reload(&app_state, transaction_id).await?;
  let terminal = txn.status.is_terminal();
  ctx.write().transaction = Some(txn);
  if terminal {
    return Ok(StepControl::Halt);
  }
  Ok(StepControl::Continue)
}

async fn enforce_expiry(ctx: ContextData<ReconcileCtxData>) -> AppResult<StepControl> {
  let (app_state, txn) = {
    let guard = ctx.read();
    (guard.app_state.clone(), guard.transaction.clone())
  };
  let txn = txn.ok_or_else(|| AppError::Internal("transaction not loaded".to_string()))?;
  let now = app_state.clock.now();
  if now < txn.expires_at {
    return Ok(StepControl::Continue);
  }
  if app_state.payments.expire_transaction(txn.id, now).await? {
    info!(transaction_id = %txn.id, "Payment transaction expired.");
  }
  let current = reload(&app_state, txn.id).await?;
  ctx.write().transaction = Some(current);
  Ok(StepControl::Halt)
}

async fn query_settlement(ctx: ContextData<ReconcileCtxData>) -> AppResult<StepControl> {
  let (app_state, hash) = {
    let guard = ctx.read();
    (
      guard.app_state.clone(),
      guard.transaction.as_ref().map(|t| t.settlement_hash.clone()),
    )
  };
  let hash = hash.ok_or_else(|| AppError::Internal("transaction not loaded".to_string()))?;
  let status = app_state.gateway.query_settlement(&hash).await;
  let settled = status.settled;
  ctx.write().settlement = Some(status);
  if !settled {
    return Ok(StepControl::Halt);
  }
  Ok(StepControl::Continue)
}

async fn claim_settlement(ctx: ContextData<ReconcileCtxData>) -> AppResult<StepControl> {
  let (app_state, txn, raw) = {
    let guard = ctx.read();
    (
      guard.app_state.clone(),
      guard.transaction.clone(),
      guard.settlement.as_ref().map(|s| s.raw.clone()).unwrap_or_default(),
    )
  };
  let txn = txn.ok_or_else(|| AppError::Internal("transaction not loaded".to_string()))?;
  let now = app_state.clock.now();

  let outcome = app_state.payments.complete_transaction(txn.id, now, raw.clone()).await?;
  match outcome {
    CompletionOutcome::Completed => {
      info!(transaction_id = %txn.id, order_id = %txn.order_id, "Settlement claimed.");
    }
    CompletionOutcome::NotInitiated => {
      info!(transaction_id = %txn.id, "Settlement already handled by another caller.");
    }
    CompletionOutcome::Expired => {
      warn!(transaction_id = %txn.id, "Settlement arrived after expiry; expiring transaction.");
      app_state.payments.expire_transaction(txn.id, now).await?;
    }
    CompletionOutcome::OrderAlreadySettled => {
      let response = json!({ "settlement": raw, "reason": "order already paid by another transaction" });
      app_state.payments.fail_transaction(txn.id, now, response).await?;
      flag_duplicate_settlement(&app_state, txn.order_id, txn.id).await;
    }
  }

  let current = reload(&app_state, txn.id).await?;
  let mut guard = ctx.write();
  guard.transaction = Some(current);
  if outcome == CompletionOutcome::Completed {
    guard.claimed = true;
    return Ok(StepControl::Continue);
  }
  Ok(StepControl::Halt)
}

fn effect_step(
  effect: Effect,
) -> impl Fn(ContextData<ReconcileCtxData>) -> std::pin::Pin<Box<dyn std::future::Future<Output = AppResult<StepControl>> + Send>>
     + Send
     + Sync
     + 'static {
  move |ctx: ContextData<ReconcileCtxData>| {
    Box::pin(async move {
      let (app_state, ids) = {
        let guard = ctx.read();
        (
          guard.app_state.clone(),
          guard.transaction.as_ref().map(|t| (t.order_id, t.id)),
        )
      };
      let (order_id, transaction_id) = ids.ok_or_else(|| AppError::Internal("transaction not loaded".to_string()))?;
      run_effect(&app_state, order_id, transaction_id, effect).await?;
      Ok(StepControl::Continue)
    })
  }
}

pub fn register_reconcile_pipeline(registry: &SagaRegistry<AppError>) {
  let not_claimed: SkipCondition<ReconcileCtxData> = Arc::new(|ctx: ContextData<ReconcileCtxData>| !ctx.read().claimed);
  let mut saga = Saga::<ReconcileCtxData, AppError>::new(
    "payment_reconciliation",
    &[
      (STEP_LOAD, false, None),
      (STEP_EXPIRY, false, None),
      (STEP_QUERY, false, None),
      (STEP_CLAIM, false, None),
      (STEP_MARK_PAID, true, Some(not_claimed.clone())),
      (STEP_COMMIT_STOCK, true, Some(not_claimed.clone())),
      (STEP_RECORD_COUPON, true, Some(not_claimed.clone())),
      (STEP_CLEAR_CART, true, Some(not_claimed.clone())),
      (STEP_APPEND_HISTORY, true, Some(not_claimed)),
    ],
  );

  saga.on_step(STEP_LOAD, load_transaction);
  saga.on_step(STEP_EXPIRY, enforce_expiry);
  saga.on_step(STEP_QUERY, query_settlement);
  saga.on_step(STEP_CLAIM, claim_settlement);
  saga.on_step(STEP_MARK_PAID, effect_step(Effect::MarkOrderPaid));
  saga.on_step(STEP_COMMIT_STOCK, effect_step(Effect::CommitStock));
  saga.on_step(STEP_RECORD_COUPON, effect_step(Effect::RecordCouponUsage));
  saga.on_step(STEP_CLEAR_CART, effect_step(Effect::ClearCart));
  saga.on_step(STEP_APPEND_HISTORY, effect_step(Effect::AppendHistory));

  registry.register(saga);
  info!("Payment reconciliation saga registered.");
}

/// Reconciles one transaction and returns its state afterwards.
#[instrument(name = "reconcile::check_payment_status", skip(app_state))]
pub async fn check_payment_status(app_state: &AppState, transaction_id: Uuid) -> AppResult<PaymentTransaction> {
  let ctx = ContextData::new(ReconcileCtxData::new(app_state.clone(), transaction_id));
  app_state.sagas.run(ctx.clone()).await?;
  let txn = ctx.read().transaction.clone();
  txn.ok_or_else(|| AppError::Internal("reconciliation finished without a transaction".to_string()))
}

/// Webhook entry point: resolves the settlement hash, then reconciles.
#[instrument(name = "reconcile::by_settlement_hash", skip(app_state))]
pub async fn reconcile_by_hash(app_state: &AppState, settlement_hash: &str) -> AppResult<PaymentTransaction> {
  let txn = app_state
    .payments
    .find_by_settlement_hash(settlement_hash)
    .await?
    .ok_or_else(|| AppError::NotFound("No payment matches this settlement".to_string()))?;
  check_payment_status(app_state, txn.id).await
}
