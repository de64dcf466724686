// storefront/src/web/handlers/order_handlers.rs

use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedCustomer;

#[instrument(name = "handler::order_history", skip(app_state, customer))]
pub async fn order_history_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  customer: AuthenticatedCustomer,
) -> Result<HttpResponse, AppError> {
  let order_id = path.into_inner();
  let order = app_state
    .orders
    .get_order(order_id)
    .await?
    .filter(|o| customer.is_admin() || o.customer_id == customer.customer_id)
    .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;
  let history = app_state.journal.history(order.id).await?;
  Ok(HttpResponse::Ok().json(json!({
      "orderId": order.id,
      "status": order.status,
      "paymentStatus": order.payment_status,
      "history": history,
  })))
}
