// storefront/src/errors.rs

use crate::db::StoreError;
use crate::services::coupon_ledger::CouponRejection;
use crate::services::payment_gateway::GatewayError;
use crate::services::stock_ledger::{LedgerError, StockShortage};
use actix_web::{HttpResponse, ResponseError};
use seamline::{SagaError, StepFailure};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("Authentication Failed: {0}")]
  Auth(String),

  #[error("Forbidden: {0}")]
  Forbidden(String),

  #[error("Resource Not Found: {0}")]
  NotFound(String),

  #[error("Insufficient stock for {} item(s)", .0.len())]
  OutOfStock(Vec<StockShortage>),

  #[error("Version conflict (current version: {current_version:?})")]
  VersionConflict { current_version: Option<i64> },

  #[error("Conflict: {0}")]
  Conflict(String),

  #[error("Promo code rejected: {}", .0.message())]
  CouponRejected(CouponRejection),

  /// Checkout failed after side effects began; they have been compensated.
  #[error("Order could not be created")]
  OrderNotCreated,

  #[error("Payment Gateway Error: {0}")]
  Gateway(#[from] GatewayError),

  #[error("Store Error: {0}")]
  Store(StoreError),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Saga Engine Error: {0}")]
  Saga(#[from] SagaError),

  #[error("Step '{step}' failed: {source}")]
  StepFailed {
    step: String,
    #[source]
    source: Box<AppError>,
    compensated: Vec<String>,
  },

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

impl AppError {
  /// Errors caused by the request rather than by the system.
  pub fn is_client_error(&self) -> bool {
    matches!(
      self,
      AppError::Validation(_)
        | AppError::Auth(_)
        | AppError::Forbidden(_)
        | AppError::NotFound(_)
        | AppError::OutOfStock(_)
        | AppError::VersionConflict { .. }
        | AppError::Conflict(_)
        | AppError::CouponRejected(_)
    )
  }
}

impl From<StoreError> for AppError {
  fn from(err: StoreError) -> Self {
    match err {
      StoreError::VersionConflict { current_version } => AppError::VersionConflict { current_version },
      StoreError::NotFound(what) => AppError::NotFound(what),
      other => AppError::Store(other),
    }
  }
}

impl From<LedgerError> for AppError {
  fn from(err: LedgerError) -> Self {
    match err {
      LedgerError::InsufficientStock(shortages) => AppError::OutOfStock(shortages),
      LedgerError::InvalidQuantity { variant_id, quantity } => {
        AppError::Validation(format!("Invalid quantity {} for variant {}", quantity, variant_id))
      }
      LedgerError::QuantityOverflow { variant_id } => {
        AppError::Validation(format!("Combined quantity for variant {} is too large", variant_id))
      }
      LedgerError::Store(e) => e.into(),
    }
  }
}

/// Client errors from a saga step surface unchanged; anything else is wrapped
/// with the step name and the compensations that ran.
impl From<StepFailure<AppError>> for AppError {
  fn from(failure: StepFailure<AppError>) -> Self {
    if failure.source.is_client_error() {
      return failure.source;
    }
    AppError::StepFailed {
      step: failure.step,
      source: Box::new(failure.source),
      compensated: failure.compensated,
    }
  }
}

impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    match err.downcast::<StoreError>() {
      Ok(store_err) => store_err.into(),
      Err(other) => AppError::Internal(other.to_string()),
    }
  }
}

impl ResponseError for AppError {
  fn error_response(&self) -> HttpResponse {
    if self.is_client_error() {
      tracing::info!(application_error = %self, "Rejecting request");
    } else {
      tracing::error!(application_error = %self, "Responding with error");
    }
    match self {
      AppError::Validation(m) => HttpResponse::BadRequest().json(json!({"error": m})),
      AppError::Auth(m) => HttpResponse::Unauthorized().json(json!({"error": m})),
      AppError::Forbidden(m) => HttpResponse::Forbidden().json(json!({"error": m})),
      AppError::NotFound(m) => HttpResponse::NotFound().json(json!({"error": m})),
      AppError::OutOfStock(shortages) => HttpResponse::Conflict().json(json!({
        "error": "Some items are out of stock",
        "outOfStock": shortages,
      })),
      AppError::VersionConflict { current_version } => HttpResponse::Conflict().json(json!({
        "error": "The resource was modified concurrently; reload and retry",
        "currentVersion": current_version,
      })),
      AppError::Conflict(m) => HttpResponse::Conflict().json(json!({"error": m})),
      AppError::CouponRejected(reason) => HttpResponse::UnprocessableEntity().json(json!({
        "error": reason.message(),
        "reason": reason,
      })),
      AppError::OrderNotCreated => HttpResponse::InternalServerError().json(json!({"error": "Order could not be created"})),
      AppError::Gateway(_) => HttpResponse::BadGateway().json(json!({"error": "Payment provider error"})),
      AppError::Store(_) => HttpResponse::InternalServerError().json(json!({"error": "Database operation failed"})),
      AppError::Config(m) => {
        HttpResponse::InternalServerError().json(json!({"error": "Configuration issue", "detail": m}))
      }
      AppError::Saga(source) => {
        tracing::error!(saga_error_source = ?source, "Saga engine error details");
        HttpResponse::InternalServerError().json(json!({"error": "Workflow processing error"}))
      }
      AppError::StepFailed { step, .. } => {
        HttpResponse::InternalServerError().json(json!({"error": "Request could not be completed", "step": step}))
      }
      AppError::Internal(_) => HttpResponse::InternalServerError().json(json!({"error": "An internal error occurred"})),
    }
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
