// storefront/src/models/promo_code.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PromoCode {
  pub id: Uuid,
  pub code: String,
  pub discount_percentage: i32,
  pub is_active: bool,
  pub valid_from: DateTime<Utc>,
  /// `None` means no end date.
  pub valid_until: Option<DateTime<Utc>>,
  pub max_total_uses: Option<i32>,
  pub current_uses: i32,
  pub max_uses_per_customer: Option<i32>,
  #[serde(skip)]
  pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PromoCodeUsage {
  pub id: Uuid,
  pub promo_code_id: Uuid,
  pub customer_id: Uuid,
  pub order_id: Uuid,
  pub used_at: DateTime<Utc>,
}
