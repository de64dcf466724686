// storefront/src/web/handlers/webhook_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::errors::AppError;
use crate::pipelines::reconcile_pipeline::reconcile_by_hash;
use crate::state::AppState;

pub const WEBHOOK_SECRET_HEADER: &str = "X-Webhook-Secret";

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SettlementNotification {
  pub settlement_hash: String,
}

fn verify_secret(app_state: &AppState, req: &HttpRequest) -> Result<(), AppError> {
  let Some(expected) = app_state.config.webhook_secret.as_deref() else {
    return Ok(());
  };
  let presented = req.headers().get(WEBHOOK_SECRET_HEADER).and_then(|v| v.to_str().ok());
  if presented == Some(expected) {
    Ok(())
  } else {
    warn!("Payment webhook rejected: missing or wrong {} header.", WEBHOOK_SECRET_HEADER);
    Err(AppError::Auth("Invalid webhook secret".to_string()))
  }
}

/// Gateway notification that a QR payment settled. Runs the same
/// reconciliation as client polling, so replays are harmless.
#[instrument(name = "handler::payment_webhook", skip(app_state, req, body))]
pub async fn payment_webhook_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  body: web::Json<SettlementNotification>,
) -> Result<HttpResponse, AppError> {
  verify_secret(app_state.get_ref(), &req)?;
  let hash = body.settlement_hash.trim();
  if hash.is_empty() {
    return Err(AppError::Validation("settlementHash is required".to_string()));
  }
  let txn = reconcile_by_hash(app_state.get_ref(), hash).await?;
  info!(transaction_id = %txn.id, status = ?txn.status, "Payment webhook processed.");
  Ok(HttpResponse::Ok().json(json!({
      "received": true,
      "transactionId": txn.id,
      "status": txn.status,
  })))
}
