// storefront/src/pipelines/contexts.rs

//! Data structs the sagas run over. Handlers receive them wrapped in
//! `seamline::ContextData`.

use crate::models::{Order, OrderItem, PaymentTransaction};
use crate::pipelines::checkout_pipeline::CheckoutRequest;
use crate::services::payment_gateway::{PaymentInstrument, SettlementStatus};
use crate::state::AppState;
use serde::Serialize;
use uuid::Uuid;

/// Where a checkout is. `Failed` is absorbing and names the step that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutStage {
  Validating,
  OrderCreated,
  ItemsCreated,
  InstrumentGenerated,
  TransactionCreated,
  Done,
  Failed { step: String },
}

#[derive(Clone)]
pub struct CheckoutCtxData {
  pub app_state: AppState,
  pub customer_id: Option<Uuid>,
  pub request: CheckoutRequest,
  pub stage: CheckoutStage,
  pub order: Option<Order>,
  pub items: Vec<OrderItem>,
  pub instrument: Option<PaymentInstrument>,
  pub transaction: Option<PaymentTransaction>,
}

impl CheckoutCtxData {
  pub fn new(app_state: AppState, customer_id: Option<Uuid>, request: CheckoutRequest) -> Self {
    Self {
      app_state,
      customer_id,
      request,
      stage: CheckoutStage::Validating,
      order: None,
      items: Vec::new(),
      instrument: None,
      transaction: None,
    }
  }
}

#[derive(Clone)]
pub struct ReconcileCtxData {
  pub app_state: AppState,
  pub transaction_id: Uuid,
  pub transaction: Option<PaymentTransaction>,
  pub settlement: Option<SettlementStatus>,
  /// Set only by the caller that won the INITIATED -> COMPLETED claim.
  pub claimed: bool,
}

impl ReconcileCtxData {
  pub fn new(app_state: AppState, transaction_id: Uuid) -> Self {
    Self {
      app_state,
      transaction_id,
      transaction: None,
      settlement: None,
      claimed: false,
    }
  }
}

#[derive(Clone)]
pub struct RenewPaymentCtxData {
  pub app_state: AppState,
  pub order_id: Uuid,
  pub customer_id: Uuid,
  pub order: Option<Order>,
  pub instrument: Option<PaymentInstrument>,
  pub transaction: Option<PaymentTransaction>,
  pub reused: bool,
}

impl RenewPaymentCtxData {
  pub fn new(app_state: AppState, order_id: Uuid, customer_id: Uuid) -> Self {
    Self {
      app_state,
      order_id,
      customer_id,
      order: None,
      instrument: None,
      transaction: None,
      reused: false,
    }
  }
}

/// Payment details handed to the customer for scanning.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentData {
  pub transaction_id: Uuid,
  pub qr_payload: String,
  pub settlement_hash: String,
  pub expires_at: chrono::DateTime<chrono::Utc>,
}

impl From<&PaymentTransaction> for PaymentData {
  fn from(txn: &PaymentTransaction) -> Self {
    Self {
      transaction_id: txn.id,
      qr_payload: txn.qr_payload.clone(),
      settlement_hash: txn.settlement_hash.clone(),
      expires_at: txn.expires_at,
    }
  }
}
