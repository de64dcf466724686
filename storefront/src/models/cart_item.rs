// storefront/src/models/cart_item.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
  pub id: Uuid,
  pub customer_id: Uuid,
  pub variant_id: Uuid,
  pub quantity: i32,
  /// Optimistic concurrency token, bumped on every write.
  pub version: i64,
  pub updated_at: DateTime<Utc>,
}
