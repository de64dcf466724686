// storefront/src/models/order_item.rs

use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Price snapshot taken at checkout. Never recomputed.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
  pub id: Uuid,
  pub order_id: Uuid,
  pub product_id: Uuid,
  pub variant_id: Uuid,
  pub color_id: Option<Uuid>,
  pub size_id: Option<Uuid>,
  pub product_name: String,
  pub unit_price_minor: i64,
  pub discount_percentage: i32,
  pub total_price_minor: i64,
  pub quantity: i32,
}
