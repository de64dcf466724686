// storefront/src/web/handlers/payment_handlers.rs

use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::AppError;
use crate::pipelines::reconcile_pipeline::check_payment_status;
use crate::pipelines::renew_payment_pipeline::renew_payment;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedCustomer;

/// Transactions are visible to the order's owner and to admins only; anyone
/// else gets a 404.
async fn ensure_visible(app_state: &AppState, transaction_id: Uuid, customer: &AuthenticatedCustomer) -> Result<(), AppError> {
  let not_found = || AppError::NotFound(format!("Payment transaction {} not found", transaction_id));
  let txn = app_state.payments.get_transaction(transaction_id).await?.ok_or_else(not_found)?;
  if customer.is_admin() {
    return Ok(());
  }
  match app_state.orders.get_order(txn.order_id).await? {
    Some(order) if order.customer_id == customer.customer_id => Ok(()),
    _ => Err(not_found()),
  }
}

#[instrument(
    name = "handler::payment_status",
    skip(app_state, customer),
    fields(customer_id = %customer.customer_id)
)]
pub async fn payment_status_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  customer: AuthenticatedCustomer,
) -> Result<HttpResponse, AppError> {
  let transaction_id = path.into_inner();
  ensure_visible(app_state.get_ref(), transaction_id, &customer).await?;
  let txn = check_payment_status(app_state.get_ref(), transaction_id).await?;
  Ok(HttpResponse::Ok().json(json!({
      "status": txn.status,
      "transaction": txn,
  })))
}

#[instrument(
    name = "handler::renew_payment",
    skip(app_state, customer),
    fields(customer_id = %customer.customer_id)
)]
pub async fn renew_payment_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  customer: AuthenticatedCustomer,
) -> Result<HttpResponse, AppError> {
  let payment_data = renew_payment(app_state.get_ref(), path.into_inner(), customer.customer_id).await?;
  Ok(HttpResponse::Ok().json(json!({
      "success": true,
      "paymentData": payment_data,
  })))
}
