// storefront/src/pipelines/renew_payment_pipeline.rs

//! Issues a fresh payment instrument for an order that is still unpaid.

use crate::errors::{AppError, Result as AppResult};
use crate::models::{OrderStatus, PaymentStatus};
use crate::pipelines::common_steps::{generate_instrument_for, initiated_transaction};
use crate::pipelines::contexts::{PaymentData, RenewPaymentCtxData};
use crate::state::AppState;
use seamline::{ContextData, Saga, SagaRegistry, StepControl};
use tracing::{info, instrument};
use uuid::Uuid;

pub const STEP_LOAD_ORDER: &str = "load_unpaid_order";
pub const STEP_RETIRE_STALE: &str = "retire_stale_transactions";
pub const STEP_GENERATE_INSTRUMENT: &str = "generate_payment_instrument";
pub const STEP_CREATE_TRANSACTION: &str = "create_payment_transaction";

async fn load_unpaid_order(ctx: ContextData<RenewPaymentCtxData>) -> AppResult<StepControl> {
  let (app_state, order_id, customer_id) = {
    let guard = ctx.read();
    (guard.app_state.clone(), guard.order_id, guard.customer_id)
  };
  let order = app_state
    .orders
    .get_order(order_id)
    .await?
    .filter(|o| o.customer_id == customer_id)
    .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;
  if order.payment_status == PaymentStatus::Paid {
    return Err(AppError::Conflict("Order is already paid".to_string()));
  }
  if order.status == OrderStatus::Cancelled {
    return Err(AppError::Conflict("Order has been cancelled".to_string()));
  }
  ctx.write().order = Some(order);
  Ok(StepControl::Continue)
}

/// Expires INITIATED transactions past their deadline. A still-live one is
/// reused and the saga halts.
async fn retire_stale_transactions(ctx: ContextData<RenewPaymentCtxData>) -> AppResult<StepControl> {
  let (app_state, order_id) = {
    let guard = ctx.read();
    (guard.app_state.clone(), guard.order_id)
  };
  let now = app_state.clock.now();
  let mut live = None;
  for txn in app_state.payments.list_for_order(order_id).await? {
    if txn.is_live_at(now) {
      live = Some(txn);
    } else if !txn.status.is_terminal() && app_state.payments.expire_transaction(txn.id, now).await? {
      info!(transaction_id = %txn.id, "Stale payment transaction expired.");
    }
  }
  if let Some(txn) = live {
    let mut guard = ctx.write();
    guard.transaction = Some(txn);
    guard.reused = true;
    return Ok(StepControl::Halt);
  }
  Ok(StepControl::Continue)
}

async fn generate_payment_instrument(ctx: ContextData<RenewPaymentCtxData>) -> AppResult<StepControl> {
  let (app_state, order) = {
    let guard = ctx.read();
    (guard.app_state.clone(), guard.order.clone())
  };
  let order = order.ok_or_else(|| AppError::Internal("order not loaded".to_string()))?;
  let instrument = generate_instrument_for(&app_state, &order, app_state.clock.now()).await?;
  ctx.write().instrument = Some(instrument);
  Ok(StepControl::Continue)
}

async fn create_payment_transaction(ctx: ContextData<RenewPaymentCtxData>) -> AppResult<StepControl> {
  let (app_state, order, instrument) = {
    let guard = ctx.read();
    (guard.app_state.clone(), guard.order.clone(), guard.instrument.clone())
  };
  let (order, instrument) = order
    .zip(instrument)
    .ok_or_else(|| AppError::Internal("order or instrument missing".to_string()))?;
  let txn = initiated_transaction(&app_state, &order, &instrument, app_state.clock.now());
  app_state.payments.insert_transaction(&txn).await?;
  info!(order_id = %order.id, transaction_id = %txn.id, "Replacement payment transaction initiated.");
  ctx.write().transaction = Some(txn);
  Ok(StepControl::Continue)
}

pub fn register_renew_payment_pipeline(registry: &SagaRegistry<AppError>) {
  let mut saga = Saga::<RenewPaymentCtxData, AppError>::new(
    "renew_payment",
    &[
      (STEP_LOAD_ORDER, false, None),
      (STEP_RETIRE_STALE, false, None),
      (STEP_GENERATE_INSTRUMENT, false, None),
      (STEP_CREATE_TRANSACTION, false, None),
    ],
  );
  saga.on_step(STEP_LOAD_ORDER, load_unpaid_order);
  saga.on_step(STEP_RETIRE_STALE, retire_stale_transactions);
  saga.on_step(STEP_GENERATE_INSTRUMENT, generate_payment_instrument);
  saga.on_step(STEP_CREATE_TRANSACTION, create_payment_transaction);
  registry.register(saga);
  info!("Payment renewal saga registered.");
}

#[instrument(name = "renew_payment", skip(app_state))]
pub async fn renew_payment(app_state: &AppState, order_id: Uuid, customer_id: Uuid) -> AppResult<PaymentData> {
  let ctx = ContextData::new(RenewPaymentCtxData::new(app_state.clone(), order_id, customer_id));
  app_state.sagas.run(ctx.clone()).await?;
  let txn = ctx.read().transaction.clone();
  txn
    .as_ref()
    .map(PaymentData::from)
    .ok_or_else(|| AppError::Internal("renewal finished without a transaction".to_string()))
}
