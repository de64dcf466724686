// storefront/src/models/payment_transaction.rs

use super::money::Currency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

pub const QR_PAYMENT: &str = "QR_PAYMENT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "transaction_status", rename_all = "UPPERCASE")]
pub enum TransactionStatus {
  Initiated,
  Completed,
  Expired,
  Failed,
}

impl TransactionStatus {
  pub fn is_terminal(&self) -> bool {
    !matches!(self, TransactionStatus::Initiated)
  }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTransaction {
  pub id: Uuid,
  pub order_id: Uuid,
  pub gateway: String,
  pub transaction_type: String,
  pub amount_minor: i64,
  pub currency: Currency,
  pub status: TransactionStatus,
  pub qr_payload: String,
  pub settlement_hash: String,
  pub expires_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
  pub gateway_request: serde_json::Value,
  pub gateway_response: Option<serde_json::Value>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl PaymentTransaction {
  pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
    self.status == TransactionStatus::Initiated && now < self.expires_at
  }
}
