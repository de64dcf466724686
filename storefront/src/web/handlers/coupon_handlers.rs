// storefront/src/web/handlers/coupon_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::errors::AppError;
use crate::services::coupon_ledger::CouponValidation;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedCustomer;

#[derive(Deserialize, Debug)]
pub struct ValidateCouponPayload {
  pub code: String,
}

/// Always 200 for a well-formed request; the body says whether the code applies.
#[instrument(
    name = "handler::validate_coupon",
    skip(app_state, req_payload, customer),
    fields(customer_id = %customer.customer_id)
)]
pub async fn validate_coupon_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<ValidateCouponPayload>,
  customer: AuthenticatedCustomer,
) -> Result<HttpResponse, AppError> {
  let code = req_payload.code.trim();
  if code.is_empty() {
    return Err(AppError::Validation("Promo code is required".to_string()));
  }
  let now = app_state.clock.now();
  let body = match app_state.coupons.validate(code, customer.customer_id, now).await? {
    CouponValidation::Valid {
      coupon,
      remaining_uses,
      customer_remaining_uses,
    } => json!({
        "valid": true,
        "promoCode": coupon,
        "remainingUses": remaining_uses,
        "customerRemainingUses": customer_remaining_uses,
    }),
    CouponValidation::Invalid(reason) => json!({
        "valid": false,
        "reason": reason,
        "error": reason.message(),
    }),
  };
  Ok(HttpResponse::Ok().json(body))
}
