// storefront/src/web/handlers/checkout_handlers.rs

use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::errors::AppError;
use crate::pipelines::checkout_pipeline::{place_order, CheckoutRequest};
use crate::state::AppState;
use crate::web::extractors::AuthenticatedCustomer;

#[instrument(
    name = "handler::checkout",
    skip(app_state, req_payload, customer),
    fields(customer_id = %customer.customer_id, lines = req_payload.cart_items.len())
)]
pub async fn checkout_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<CheckoutRequest>,
  customer: AuthenticatedCustomer,
) -> Result<HttpResponse, AppError> {
  match place_order(app_state.get_ref(), Some(customer.customer_id), req_payload.into_inner()).await {
    Ok(receipt) => {
      info!(order_id = %receipt.order.id, "Checkout succeeded.");
      Ok(HttpResponse::Created().json(json!({
          "success": true,
          "order": receipt.order,
          "paymentData": receipt.payment_data,
      })))
    }
    Err(app_err) => {
      warn!(error = %app_err, "Checkout failed.");
      Err(app_err)
    }
  }
}
