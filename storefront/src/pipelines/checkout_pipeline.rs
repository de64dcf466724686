// storefront/src/pipelines/checkout_pipeline.rs

//! Order placement: order, line items, payment instrument and payment
//! transaction are created as one unit. A failure after the order exists
//! deletes it again.

use crate::errors::{AppError, Result as AppResult};
use crate::models::money::discounted_line_total;
use crate::models::{Currency, Order, OrderItem, OrderStatus, PaymentStatus, SettlementEffects};
use crate::pipelines::common_steps::{generate_instrument_for, initiated_transaction, journal_append};
use crate::pipelines::contexts::{CheckoutCtxData, CheckoutStage, PaymentData};
use crate::services::coupon_ledger::CouponValidation;
use crate::services::order_number;
use crate::services::stock_ledger::{merge_lines, StockLine};
use crate::state::AppState;
use seamline::{ContextData, Saga, SagaOutcome, SagaRegistry, StepControl};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

pub const STEP_VALIDATE: &str = "validate_checkout";
pub const STEP_CREATE_ORDER: &str = "create_order_record";
pub const STEP_CREATE_ITEMS: &str = "create_order_items";
pub const STEP_GENERATE_INSTRUMENT: &str = "generate_payment_instrument";
pub const STEP_CREATE_TRANSACTION: &str = "create_payment_transaction";
pub const STEP_RECORD_PLACED: &str = "record_order_placed";

/// One cart line as submitted. Prices are in minor units.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutLine {
  pub variant_id: Uuid,
  pub product_id: Uuid,
  pub product_name: String,
  #[serde(default)]
  pub color_id: Option<Uuid>,
  #[serde(default)]
  pub size_id: Option<Uuid>,
  pub quantity: i32,
  pub unit_price: i64,
  #[serde(default)]
  pub discount_percentage: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
  #[serde(default)]
  pub customer_id: Option<Uuid>,
  pub cart_items: Vec<CheckoutLine>,
  pub subtotal: i64,
  #[serde(default)]
  pub discount_amount: i64,
  pub total_amount: i64,
  #[serde(default)]
  pub promo_code_id: Option<Uuid>,
  pub shipping_address: serde_json::Value,
  pub currency: Currency,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
  pub id: Uuid,
  pub order_number: String,
  pub total_amount: i64,
  pub currency: Currency,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReceipt {
  pub order: OrderSummary,
  pub payment_data: PaymentData,
}

/// Checks that the submitted lines and totals are well-formed and add up.
pub fn validate_amounts(req: &CheckoutRequest) -> AppResult<()> {
  if req.cart_items.is_empty() {
    return Err(AppError::Validation("Cart is empty".to_string()));
  }
  let mut computed_subtotal: i64 = 0;
  for line in &req.cart_items {
    if line.quantity <= 0 {
      return Err(AppError::Validation(format!(
        "Quantity for variant {} must be positive",
        line.variant_id
      )));
    }
    if !(0..=100).contains(&line.discount_percentage) {
      return Err(AppError::Validation(format!(
        "Discount percentage for variant {} must be between 0 and 100",
        line.variant_id
      )));
    }
    if line.unit_price < 0 {
      return Err(AppError::Validation(format!(
        "Unit price for variant {} must not be negative",
        line.variant_id
      )));
    }
    computed_subtotal = discounted_line_total(line.quantity, line.unit_price, line.discount_percentage)
      .and_then(|line_total| computed_subtotal.checked_add(line_total))
      .ok_or_else(|| AppError::Validation(format!("Amount for variant {} is too large", line.variant_id)))?;
  }
  merge_lines(&stock_lines(req))?;
  if req.subtotal != computed_subtotal {
    return Err(AppError::Validation(format!(
      "Subtotal {} does not match line totals {}",
      req.subtotal, computed_subtotal
    )));
  }
  if req.discount_amount < 0 || req.discount_amount > req.subtotal {
    return Err(AppError::Validation("Discount must be between zero and the subtotal".to_string()));
  }
  if req.discount_amount > 0 && req.promo_code_id.is_none() {
    return Err(AppError::Validation("A discount requires a promo code".to_string()));
  }
  if req.total_amount != req.subtotal - req.discount_amount {
    return Err(AppError::Validation(format!(
      "Total {} does not equal subtotal minus discount {}",
      req.total_amount,
      req.subtotal - req.discount_amount
    )));
  }
  if req.total_amount <= 0 {
    return Err(AppError::Validation("Order total must be positive".to_string()));
  }
  Ok(())
}

fn stock_lines(req: &CheckoutRequest) -> Vec<StockLine> {
  req
    .cart_items
    .iter()
    .map(|l| StockLine {
      variant_id: l.variant_id,
      quantity: l.quantity,
    })
    .collect()
}

async fn validate_checkout(ctx: ContextData<CheckoutCtxData>) -> AppResult<StepControl> {
  let (app_state, customer_id, req) = {
    let guard = ctx.read();
    (guard.app_state.clone(), guard.customer_id, guard.request.clone())
  };
  let customer_id = customer_id.ok_or_else(|| AppError::Auth("Customer is not authenticated".to_string()))?;
  if req.customer_id.is_some_and(|claimed| claimed != customer_id) {
    return Err(AppError::Auth("Checkout customer does not match the caller".to_string()));
  }
  validate_amounts(&req)?;

  if let Some(promo_code_id) = req.promo_code_id {
    let now = app_state.clock.now();
    if let CouponValidation::Invalid(reason) = app_state.coupons.validate_id(promo_code_id, customer_id, now).await? {
      return Err(AppError::CouponRejected(reason));
    }
  }

  let availability = app_state.stock.check_availability(&stock_lines(&req)).await?;
  if !availability.is_available() {
    info!(%customer_id, shortages = availability.shortages.len(), "Checkout rejected: out of stock.");
    return Err(AppError::OutOfStock(availability.shortages));
  }
  Ok(StepControl::Continue)
}

async fn create_order_record(ctx: ContextData<CheckoutCtxData>) -> AppResult<StepControl> {
  let (app_state, customer_id, req) = {
    let guard = ctx.read();
    (guard.app_state.clone(), guard.customer_id, guard.request.clone())
  };
  let customer_id = customer_id.ok_or_else(|| AppError::Internal("customer vanished after validation".to_string()))?;
  let cfg = app_state.config.clone();
  let now = app_state.clock.now();

  for attempt in 1..=cfg.order_number_attempts {
    let candidate = order_number::generate(&cfg.order_number_prefix, now);
    if app_state.orders.order_number_exists(&candidate).await? {
      warn!(attempt, order_number = %candidate, "Order number collision, regenerating.");
      continue;
    }
    let order = Order {
      id: Uuid::new_v4(),
      order_number: candidate,
      customer_id,
      subtotal_minor: req.subtotal,
      discount_minor: req.discount_amount,
      total_minor: req.total_amount,
      currency: req.currency,
      status: OrderStatus::Pending,
      payment_status: PaymentStatus::Pending,
      promo_code_id: req.promo_code_id,
      shipping_address: req.shipping_address.clone(),
      effects: SettlementEffects::for_new_order(req.promo_code_id.is_some()),
      created_at: now,
      updated_at: now,
      paid_at: None,
    };
    match app_state.orders.insert_order(&order).await {
      Ok(()) => {
        info!(order_id = %order.id, order_number = %order.order_number, "Order record created.");
        let mut guard = ctx.write();
        guard.order = Some(order);
        guard.stage = CheckoutStage::OrderCreated;
        return Ok(StepControl::Continue);
      }
      Err(crate::db::StoreError::Duplicate(what)) => {
        warn!(attempt, %what, "Order number taken at insert, regenerating.");
      }
      Err(e) => return Err(e.into()),
    }
  }
  Err(AppError::Internal(format!(
    "Could not allocate a unique order number after {} attempts",
    cfg.order_number_attempts
  )))
}

async fn delete_created_order(ctx: ContextData<CheckoutCtxData>) -> AppResult<()> {
  let (app_state, order_id) = {
    let guard = ctx.read();
    (guard.app_state.clone(), guard.order.as_ref().map(|o| o.id))
  };
  if let Some(order_id) = order_id {
    app_state.orders.delete_order(order_id).await?;
    warn!(%order_id, "Checkout rolled back: order deleted.");
  }
  Ok(())
}

async fn create_order_items(ctx: ContextData<CheckoutCtxData>) -> AppResult<StepControl> {
  let (app_state, order_id, req) = {
    let guard = ctx.read();
    (
      guard.app_state.clone(),
      guard.order.as_ref().map(|o| o.id),
      guard.request.clone(),
    )
  };
  let order_id = order_id.ok_or_else(|| AppError::Internal("order missing before item creation".to_string()))?;
  let items: Vec<OrderItem> = req
    .cart_items
    .iter()
    .map(|line| {
      let total_price_minor = discounted_line_total(line.quantity, line.unit_price, line.discount_percentage)
        .ok_or_else(|| AppError::Validation(format!("Amount for variant {} is too large", line.variant_id)))?;
      Ok(OrderItem {
        id: Uuid::new_v4(),
        order_id,
        product_id: line.product_id,
        variant_id: line.variant_id,
        color_id: line.color_id,
        size_id: line.size_id,
        product_name: line.product_name.clone(),
        unit_price_minor: line.unit_price,
        discount_percentage: line.discount_percentage,
        total_price_minor,
        quantity: line.quantity,
      })
    })
    .collect::<AppResult<_>>()?;
  app_state.orders.insert_order_items(&items).await?;

  let mut guard = ctx.write();
  guard.items = items;
  guard.stage = CheckoutStage::ItemsCreated;
  Ok(StepControl::Continue)
}

async fn generate_payment_instrument(ctx: ContextData<CheckoutCtxData>) -> AppResult<StepControl> {
  let (app_state, order) = {
    let guard = ctx.read();
    (guard.app_state.clone(), guard.order.clone())
  };
  let order = order.ok_or_else(|| AppError::Internal("order missing before instrument generation".to_string()))?;
  let now = app_state.clock.now();
  let instrument = generate_instrument_for(&app_state, &order, now).await?;

  let mut guard = ctx.write();
  guard.instrument = Some(instrument);
  guard.stage = CheckoutStage::InstrumentGenerated;
  Ok(StepControl::Continue)
}

async fn create_payment_transaction(ctx: ContextData<CheckoutCtxData>) -> AppResult<StepControl> {
  let (app_state, order, instrument) = {
    let guard = ctx.read();
    (guard.app_state.clone(), guard.order.clone(), guard.instrument.clone())
  };
  let (order, instrument) = order
    .zip(instrument)
    .ok_or_else(|| AppError::Internal("order or instrument missing before transaction".to_string()))?;
  let txn = initiated_transaction(&app_state, &order, &instrument, app_state.clock.now());
  app_state.payments.insert_transaction(&txn).await?;
  info!(order_id = %order.id, transaction_id = %txn.id, expires_at = %txn.expires_at, "Payment transaction initiated.");

  let mut guard = ctx.write();
  guard.transaction = Some(txn);
  guard.stage = CheckoutStage::TransactionCreated;
  Ok(StepControl::Continue)
}

async fn record_order_placed(ctx: ContextData<CheckoutCtxData>) -> AppResult<StepControl> {
  let (app_state, order_id) = {
    let guard = ctx.read();
    (guard.app_state.clone(), guard.order.as_ref().map(|o| o.id))
  };
  if let Some(order_id) = order_id {
    journal_append(&app_state, order_id, OrderStatus::Pending, "Order has been placed", Some("customer")).await?;
  }
  Ok(StepControl::Continue)
}

pub fn register_checkout_pipeline(registry: &SagaRegistry<AppError>) {
  let mut saga = Saga::<CheckoutCtxData, AppError>::new(
    "checkout",
    &[
      (STEP_VALIDATE, false, None),
      (STEP_CREATE_ORDER, false, None),
      (STEP_CREATE_ITEMS, false, None),
      (STEP_GENERATE_INSTRUMENT, false, None),
      (STEP_CREATE_TRANSACTION, false, None),
      (STEP_RECORD_PLACED, true, None),
    ],
  );

  saga.on_step(STEP_VALIDATE, validate_checkout);
  saga.on_step(STEP_CREATE_ORDER, create_order_record);
  saga.compensate_with(STEP_CREATE_ORDER, delete_created_order);
  saga.on_step(STEP_CREATE_ITEMS, create_order_items);
  saga.on_step(STEP_GENERATE_INSTRUMENT, generate_payment_instrument);
  saga.on_step(STEP_CREATE_TRANSACTION, create_payment_transaction);
  saga.on_step(STEP_RECORD_PLACED, record_order_placed);

  registry.register(saga);
  info!("Checkout saga registered.");
}

/// Places an order for `customer_id` and returns the instrument to pay it with.
#[instrument(name = "checkout::place_order", skip(app_state, request), fields(customer_id = ?customer_id))]
pub async fn place_order(
  app_state: &AppState,
  customer_id: Option<Uuid>,
  request: CheckoutRequest,
) -> AppResult<CheckoutReceipt> {
  let ctx = ContextData::new(CheckoutCtxData::new(app_state.clone(), customer_id, request));

  match app_state.sagas.run(ctx.clone()).await {
    Ok(SagaOutcome::Completed) => {
      let mut guard = ctx.write();
      guard.stage = CheckoutStage::Done;
      let (order, txn) = guard
        .order
        .as_ref()
        .zip(guard.transaction.as_ref())
        .ok_or_else(|| AppError::Internal("Checkout completed without an order or transaction".to_string()))?;
      info!(order_id = %order.id, transaction_id = %txn.id, "Checkout completed.");
      Ok(CheckoutReceipt {
        order: OrderSummary {
          id: order.id,
          order_number: order.order_number.clone(),
          total_amount: order.total_minor,
          currency: order.currency,
        },
        payment_data: PaymentData::from(txn),
      })
    }
    Ok(SagaOutcome::Halted { step }) => {
      ctx.write().stage = CheckoutStage::Failed { step: step.clone() };
      Err(AppError::Internal(format!("Checkout halted unexpectedly at '{}'", step)))
    }
    Err(AppError::StepFailed {
      step,
      source,
      compensated,
    }) => {
      error!(%step, error = %source, ?compensated, "Checkout failed and was rolled back.");
      ctx.write().stage = CheckoutStage::Failed { step };
      Err(AppError::OrderNotCreated)
    }
    Err(e) => {
      let step = match ctx.read().stage {
        CheckoutStage::Validating => STEP_VALIDATE,
        _ => "unknown",
      };
      ctx.write().stage = CheckoutStage::Failed { step: step.to_string() };
      Err(e)
    }
  }
}
