// storefront/src/pipelines/order_status.rs

use crate::errors::{AppError, Result as AppResult};
use crate::models::{Order, OrderStatus};
use crate::pipelines::common_steps::journal_note;
use crate::state::AppState;
use tracing::{info, instrument};
use uuid::Uuid;

/// Moves an order's business status forward (or to CANCELLED) with a
/// conditional write from the status it was read in.
#[instrument(name = "order_status::advance", skip(app_state, note))]
pub async fn advance_order_status(
  app_state: &AppState,
  order_id: Uuid,
  to: OrderStatus,
  actor: &str,
  note: Option<&str>,
) -> AppResult<Order> {
  let order = app_state
    .orders
    .get_order(order_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;
  let from = order.status;
  if !from.can_transition_to(to) {
    return Err(AppError::Validation(format!(
      "Cannot move order from {} to {}",
      from.as_str(),
      to.as_str()
    )));
  }
  let now = app_state.clock.now();
  if !app_state.orders.update_status(order_id, from, to, now).await? {
    return Err(AppError::Conflict(
      "Order status changed concurrently; reload and retry".to_string(),
    ));
  }
  info!(%order_id, from = from.as_str(), to = to.as_str(), "Order status advanced.");

  let default_note = format!("Status changed from {} to {}", from.as_str(), to.as_str());
  journal_note(app_state, order_id, to, note.unwrap_or(&default_note), Some(actor)).await;

  app_state
    .orders
    .get_order(order_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))
}
