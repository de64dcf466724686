// storefront/src/web/handlers/admin_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::OrderStatus;
use crate::pipelines::order_status::advance_order_status;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedCustomer;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdatePayload {
  pub status: OrderStatus,
  #[serde(default)]
  pub note: Option<String>,
}

#[instrument(
    name = "handler::admin_update_status",
    skip(app_state, req_payload, caller),
    fields(caller = %caller.customer_id, to = ?req_payload.status)
)]
pub async fn update_order_status_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  req_payload: web::Json<StatusUpdatePayload>,
  caller: AuthenticatedCustomer,
) -> Result<HttpResponse, AppError> {
  caller.require_admin()?;
  let actor = format!("admin:{}", caller.customer_id);
  let payload = req_payload.into_inner();
  let order = advance_order_status(
    app_state.get_ref(),
    path.into_inner(),
    payload.status,
    &actor,
    payload.note.as_deref(),
  )
  .await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "order": order })))
}
