// storefront/src/pipelines/common_steps.rs

//! Steps shared by checkout and payment renewal.

use crate::errors::{AppError, Result as AppResult};
use crate::models::payment_transaction::QR_PAYMENT;
use crate::models::{Order, OrderStatus, PaymentTransaction, StatusHistoryEntry, TransactionStatus};
use crate::services::payment_gateway::{InstrumentRequest, PaymentInstrument};
use crate::state::AppState;
use chrono::{DateTime, Utc};
use tracing::{instrument, warn};
use uuid::Uuid;

#[instrument(name = "common_step::generate_instrument", skip_all, fields(order_id = %order.id), err)]
pub async fn generate_instrument_for(app_state: &AppState, order: &Order, now: DateTime<Utc>) -> AppResult<PaymentInstrument> {
  let req = InstrumentRequest {
    amount_minor: order.total_minor,
    currency: order.currency,
    bill_number: order.order_number.clone(),
    merchant: app_state.config.merchant.clone(),
    issued_at: now,
  };
  Ok(app_state.gateway.generate_instrument(&req).await?)
}

pub fn initiated_transaction(
  app_state: &AppState,
  order: &Order,
  instrument: &PaymentInstrument,
  now: DateTime<Utc>,
) -> PaymentTransaction {
  PaymentTransaction {
    id: Uuid::new_v4(),
    order_id: order.id,
    gateway: app_state.gateway.name().to_string(),
    transaction_type: QR_PAYMENT.to_string(),
    amount_minor: order.total_minor,
    currency: order.currency,
    status: TransactionStatus::Initiated,
    qr_payload: instrument.qr_payload.clone(),
    settlement_hash: instrument.settlement_hash.clone(),
    expires_at: instrument.expires_at,
    completed_at: None,
    gateway_request: instrument.request.clone(),
    gateway_response: None,
    created_at: now,
    updated_at: now,
  }
}

/// Best-effort journal write. Failures are logged and swallowed.
pub async fn journal_note(app_state: &AppState, order_id: Uuid, status: OrderStatus, note: &str, actor: Option<&str>) -> bool {
  match journal_append(app_state, order_id, status, note, actor).await {
    Ok(()) => true,
    Err(e) => {
      warn!(%order_id, error = %e, "Failed to append order status history.");
      false
    }
  }
}

/// Like `journal_note` but surfaces the error, for callers that track the write.
pub async fn journal_append(
  app_state: &AppState,
  order_id: Uuid,
  status: OrderStatus,
  note: &str,
  actor: Option<&str>,
) -> AppResult<()> {
  let entry = StatusHistoryEntry {
    id: Uuid::new_v4(),
    order_id,
    status,
    note: note.to_string(),
    actor: actor.map(str::to_string),
    created_at: app_state.clock.now(),
  };
  app_state.journal.append(&entry).await.map_err(AppError::from)
}
