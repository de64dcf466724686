// storefront/src/models/order.rs

use super::money::Currency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

/// Business status. Moves forward only, or to `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, SqlxType)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "order_status", rename_all = "UPPERCASE")]
pub enum OrderStatus {
  Pending,
  Confirmed,
  Shipped,
  Delivered,
  Cancelled,
}

impl OrderStatus {
  pub fn is_terminal(&self) -> bool {
    matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
  }

  pub fn can_transition_to(&self, next: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
      (self, next),
      (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Shipped) | (Confirmed, Cancelled)
        | (Shipped, Delivered) | (Shipped, Cancelled)
    )
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      OrderStatus::Pending => "PENDING",
      OrderStatus::Confirmed => "CONFIRMED",
      OrderStatus::Shipped => "SHIPPED",
      OrderStatus::Delivered => "DELIVERED",
      OrderStatus::Cancelled => "CANCELLED",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "payment_status", rename_all = "UPPERCASE")]
pub enum PaymentStatus {
  Pending,
  Paid,
}

/// Progress of one post-payment effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, SqlxType)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "effect_state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EffectState {
  #[default]
  Pending,
  Applied,
  /// Needs a human; never retried automatically.
  Escalated,
  NotApplicable,
}

impl EffectState {
  pub fn is_settled(&self) -> bool {
    !matches!(self, EffectState::Pending)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Effect {
  MarkOrderPaid,
  CommitStock,
  RecordCouponUsage,
  ClearCart,
  AppendHistory,
}

impl Effect {
  pub const ALL: [Effect; 5] = [
    Effect::MarkOrderPaid,
    Effect::CommitStock,
    Effect::RecordCouponUsage,
    Effect::ClearCart,
    Effect::AppendHistory,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Effect::MarkOrderPaid => "mark_order_paid",
      Effect::CommitStock => "commit_stock",
      Effect::RecordCouponUsage => "record_coupon_usage",
      Effect::ClearCart => "clear_cart",
      Effect::AppendHistory => "append_history",
    }
  }
}

/// Per-effect markers stored on the order, one column each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SettlementEffects {
  pub mark_order_paid: EffectState,
  pub commit_stock: EffectState,
  pub record_coupon_usage: EffectState,
  pub clear_cart: EffectState,
  pub append_history: EffectState,
}

impl SettlementEffects {
  /// Fresh markers for a new order; coupon usage is moot without a promo code.
  pub fn for_new_order(has_promo_code: bool) -> Self {
    Self {
      record_coupon_usage: if has_promo_code {
        EffectState::Pending
      } else {
        EffectState::NotApplicable
      },
      ..Default::default()
    }
  }

  pub fn get(&self, effect: Effect) -> EffectState {
    match effect {
      Effect::MarkOrderPaid => self.mark_order_paid,
      Effect::CommitStock => self.commit_stock,
      Effect::RecordCouponUsage => self.record_coupon_usage,
      Effect::ClearCart => self.clear_cart,
      Effect::AppendHistory => self.append_history,
    }
  }

  pub fn set(&mut self, effect: Effect, state: EffectState) {
    let slot = match effect {
      Effect::MarkOrderPaid => &mut self.mark_order_paid,
      Effect::CommitStock => &mut self.commit_stock,
      Effect::RecordCouponUsage => &mut self.record_coupon_usage,
      Effect::ClearCart => &mut self.clear_cart,
      Effect::AppendHistory => &mut self.append_history,
    };
    *slot = state;
  }

  pub fn pending(&self) -> Vec<Effect> {
    Effect::ALL.into_iter().filter(|e| !self.get(*e).is_settled()).collect()
  }

  pub fn all_settled(&self) -> bool {
    self.pending().is_empty()
  }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  pub id: Uuid,
  pub order_number: String,
  pub customer_id: Uuid,
  pub subtotal_minor: i64,
  pub discount_minor: i64,
  pub total_minor: i64,
  pub currency: Currency,
  pub status: OrderStatus,
  pub payment_status: PaymentStatus,
  pub promo_code_id: Option<Uuid>,
  pub shipping_address: serde_json::Value,
  #[sqlx(flatten)]
  pub effects: SettlementEffects,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub paid_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_never_regresses() {
    assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Confirmed));
    assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Cancelled));
    assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Pending));
    assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Delivered));
    assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
    assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Confirmed));
  }

  #[test]
  fn coupon_effect_not_applicable_without_promo() {
    let fx = SettlementEffects::for_new_order(false);
    assert_eq!(fx.record_coupon_usage, EffectState::NotApplicable);
    assert_eq!(fx.pending().len(), 4);

    let mut fx = SettlementEffects::for_new_order(true);
    for e in Effect::ALL {
      fx.set(e, EffectState::Applied);
    }
    fx.set(Effect::CommitStock, EffectState::Escalated);
    assert!(fx.all_settled());
  }
}
