// storefront/src/models/status_history.rs

use super::order::OrderStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
  pub id: Uuid,
  pub order_id: Uuid,
  pub status: OrderStatus,
  pub note: String,
  pub actor: Option<String>,
  pub created_at: DateTime<Utc>,
}
