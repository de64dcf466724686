// storefront/src/web/handlers/cart_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedCustomer;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SetQuantityPayload {
  pub quantity: i32,
  /// Version the caller last saw; omitted when adding a new line.
  #[serde(default)]
  pub version: Option<i64>,
}

#[instrument(name = "handler::get_cart", skip(app_state, customer), fields(customer_id = %customer.customer_id))]
pub async fn get_cart_handler(
  app_state: web::Data<AppState>,
  customer: AuthenticatedCustomer,
) -> Result<HttpResponse, AppError> {
  let items = app_state.carts.list_cart(customer.customer_id).await?;
  Ok(HttpResponse::Ok().json(json!({ "items": items })))
}

#[instrument(
    name = "handler::set_cart_quantity",
    skip(app_state, req_payload, customer),
    fields(customer_id = %customer.customer_id, quantity = req_payload.quantity, version = ?req_payload.version)
)]
pub async fn set_cart_quantity_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  req_payload: web::Json<SetQuantityPayload>,
  customer: AuthenticatedCustomer,
) -> Result<HttpResponse, AppError> {
  if req_payload.quantity < 0 {
    return Err(AppError::Validation("Quantity must not be negative".to_string()));
  }
  let variant_id = path.into_inner();
  let now = app_state.clock.now();
  let item = app_state
    .carts
    .set_quantity(customer.customer_id, variant_id, req_payload.quantity, req_payload.version, now)
    .await?;
  info!(%variant_id, removed = item.is_none(), "Cart line updated.");
  Ok(HttpResponse::Ok().json(json!({ "cartItem": item })))
}
