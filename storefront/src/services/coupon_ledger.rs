// storefront/src/services/coupon_ledger.rs

//! Promo code validation and redemption accounting.

use crate::db::StoreError;
use crate::models::PromoCode;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CouponRejection {
  NotFound,
  Inactive,
  NotYetValid,
  Expired,
  UsageLimitReached,
  CustomerLimitReached,
}

impl CouponRejection {
  pub fn message(&self) -> &'static str {
    match self {
      CouponRejection::NotFound => "Promo code not found",
      CouponRejection::Inactive => "Promo code is not active",
      CouponRejection::NotYetValid => "Promo code is not valid yet",
      CouponRejection::Expired => "Promo code has expired",
      CouponRejection::UsageLimitReached => "Promo code usage limit has been reached",
      CouponRejection::CustomerLimitReached => "You have already used this promo code the maximum number of times",
    }
  }
}

#[derive(Debug, Clone)]
pub enum CouponValidation {
  Valid {
    coupon: PromoCode,
    /// `None` is unlimited.
    remaining_uses: Option<i64>,
    customer_remaining_uses: Option<i64>,
  },
  Invalid(CouponRejection),
}

impl CouponValidation {
  pub fn is_valid(&self) -> bool {
    matches!(self, CouponValidation::Valid { .. })
  }

  pub fn rejection(&self) -> Option<CouponRejection> {
    match self {
      CouponValidation::Invalid(r) => Some(*r),
      CouponValidation::Valid { .. } => None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageRecord {
  Recorded,
  /// A usage row for this order already existed; nothing changed.
  AlreadyRecorded,
}

/// Applies the coupon rules in order, stopping at the first that fails.
pub fn evaluate(coupon: Option<PromoCode>, customer_redemptions: i64, now: DateTime<Utc>) -> CouponValidation {
  let coupon = match coupon {
    Some(c) if c.deleted_at.is_none() => c,
    _ => return CouponValidation::Invalid(CouponRejection::NotFound),
  };
  if !coupon.is_active {
    return CouponValidation::Invalid(CouponRejection::Inactive);
  }
  if now < coupon.valid_from {
    return CouponValidation::Invalid(CouponRejection::NotYetValid);
  }
  if coupon.valid_until.is_some_and(|until| now > until) {
    return CouponValidation::Invalid(CouponRejection::Expired);
  }
  let remaining_uses = coupon.max_total_uses.map(|max| i64::from(max) - i64::from(coupon.current_uses));
  if remaining_uses.is_some_and(|left| left <= 0) {
    return CouponValidation::Invalid(CouponRejection::UsageLimitReached);
  }
  let customer_remaining_uses = coupon
    .max_uses_per_customer
    .map(|max| i64::from(max) - customer_redemptions);
  if customer_remaining_uses.is_some_and(|left| left <= 0) {
    return CouponValidation::Invalid(CouponRejection::CustomerLimitReached);
  }
  CouponValidation::Valid {
    coupon,
    remaining_uses,
    customer_remaining_uses,
  }
}

#[async_trait]
pub trait CouponLedger: Send + Sync {
  /// Case-insensitive lookup, soft-deleted codes included.
  async fn find_by_code(&self, code: &str) -> Result<Option<PromoCode>, StoreError>;

  async fn find_by_id(&self, promo_code_id: Uuid) -> Result<Option<PromoCode>, StoreError>;

  async fn customer_redemptions(&self, promo_code_id: Uuid, customer_id: Uuid) -> Result<i64, StoreError>;

  /// Inserts the usage row and bumps the global counter in one atomic step.
  /// Idempotent per order.
  async fn record_usage(
    &self,
    promo_code_id: Uuid,
    customer_id: Uuid,
    order_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<UsageRecord, StoreError>;

  async fn validate(&self, code: &str, customer_id: Uuid, now: DateTime<Utc>) -> Result<CouponValidation, StoreError> {
    let coupon = self.find_by_code(code.trim()).await?;
    self.validate_found(coupon, customer_id, now).await
  }

  async fn validate_id(
    &self,
    promo_code_id: Uuid,
    customer_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<CouponValidation, StoreError> {
    let coupon = self.find_by_id(promo_code_id).await?;
    self.validate_found(coupon, customer_id, now).await
  }

  async fn validate_found(
    &self,
    coupon: Option<PromoCode>,
    customer_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<CouponValidation, StoreError> {
    let redemptions = match &coupon {
      Some(c) => self.customer_redemptions(c.id, customer_id).await?,
      None => 0,
    };
    Ok(evaluate(coupon, redemptions, now))
  }
}
