// storefront/src/services/payment_gateway.rs

//! Payment gateway boundary: QR instrument generation and settlement lookup.

use crate::models::Currency;
use crate::services::emv_qr::{EmvError, TlvBuilder};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
  #[error("Invalid instrument field: {0}")]
  InvalidField(#[from] EmvError),

  #[error("Amount must be positive, got {0}")]
  InvalidAmount(i64),

  #[error("Payment gateway unavailable: {0}")]
  Unavailable(String),
}

/// Merchant identity embedded in every instrument.
#[derive(Debug, Clone)]
pub struct MerchantProfile {
  pub account_id: String,
  pub merchant_id: String,
  pub acquiring_bank: String,
  pub name: String,
  pub city: String,
  pub country: String,
  pub category_code: String,
}

#[derive(Debug, Clone)]
pub struct InstrumentRequest {
  pub amount_minor: i64,
  pub currency: Currency,
  pub bill_number: String,
  pub merchant: MerchantProfile,
  pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PaymentInstrument {
  pub qr_payload: String,
  pub settlement_hash: String,
  pub expires_at: DateTime<Utc>,
  /// What was sent, kept on the transaction as `gateway_request`.
  pub request: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct SettlementStatus {
  pub settled: bool,
  pub raw: serde_json::Value,
}

impl SettlementStatus {
  pub fn unsettled(reason: impl Into<String>) -> Self {
    Self {
      settled: false,
      raw: json!({ "error": reason.into() }),
    }
  }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
  fn name(&self) -> &str;

  async fn generate_instrument(&self, req: &InstrumentRequest) -> Result<PaymentInstrument, GatewayError>;

  /// Never fails: transport errors and odd responses come back as
  /// `settled = false` with the reason in `raw`.
  async fn query_settlement(&self, settlement_hash: &str) -> SettlementStatus;
}

pub fn settlement_hash(qr_payload: &str) -> String {
  hex::encode(Sha256::digest(qr_payload.as_bytes()))
}

/// Builds the EMV payload for `req`, valid for `ttl` from `issued_at`.
pub fn build_instrument(req: &InstrumentRequest, ttl: Duration) -> Result<PaymentInstrument, GatewayError> {
  if req.amount_minor <= 0 {
    return Err(GatewayError::InvalidAmount(req.amount_minor));
  }
  let m = &req.merchant;
  let expires_at = req.issued_at + ttl;
  let amount = req.currency.format_minor(req.amount_minor);

  let account = TlvBuilder::new()
    .field("00", &m.account_id)?
    .field("01", &m.merchant_id)?
    .field("02", &m.acquiring_bank)?;
  let additional = TlvBuilder::new().field("01", &req.bill_number)?;
  let timestamps = TlvBuilder::new()
    .field("00", &req.issued_at.timestamp_millis().to_string())?
    .field("01", &expires_at.timestamp_millis().to_string())?;

  let qr_payload = TlvBuilder::new()
    .field("00", "01")?
    .field("01", "12")?
    .template("29", account)?
    .field("52", &m.category_code)?
    .field("53", req.currency.numeric_code())?
    .field("54", &amount)?
    .field("58", &m.country)?
    .field("59", &m.name)?
    .field("60", &m.city)?
    .template("62", additional)?
    .template("99", timestamps)?
    .finish_with_crc();

  Ok(PaymentInstrument {
    settlement_hash: settlement_hash(&qr_payload),
    expires_at,
    request: json!({
      "billNumber": req.bill_number,
      "amount": amount,
      "currency": req.currency.code(),
      "merchantId": m.merchant_id,
      "accountId": m.account_id,
      "issuedAt": req.issued_at,
      "expiresAt": expires_at,
    }),
    qr_payload,
  })
}
