// storefront/src/web/handlers/sandbox_handlers.rs

use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::{info, instrument};

use crate::errors::AppError;
use crate::state::AppState;

/// Simulates the customer's bank paying a QR. Only reachable with the sandbox
/// gateway; 404 otherwise.
#[instrument(name = "handler::sandbox_settle", skip(app_state))]
pub async fn sandbox_settle_handler(
  app_state: web::Data<AppState>,
  path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
  let sandbox = app_state
    .sandbox
    .as_ref()
    .ok_or_else(|| AppError::NotFound("Sandbox gateway is not enabled".to_string()))?;
  let hash = path.into_inner();
  sandbox.settle(&hash);
  info!(settlement_hash = %hash, "Sandbox settlement recorded.");
  Ok(HttpResponse::Accepted().json(json!({ "settled": true, "settlementHash": hash })))
}
