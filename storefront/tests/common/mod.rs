// tests/common/mod.rs
#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use once_cell::sync::Lazy;
use serde_json::json;
use std::sync::Arc;
use storefront::config::AppConfig;
use storefront::db::MemoryStore;
use storefront::models::{Currency, PromoCode};
use storefront::pipelines::checkout_pipeline::{place_order, CheckoutLine, CheckoutReceipt, CheckoutRequest};
use storefront::services::clock::ManualClock;
use storefront::services::payment_sandbox::SandboxGateway;
use storefront::state::{AppState, StoreHandles};
use tracing::Level;
use uuid::Uuid;

/// A storefront wired to the in-memory store, the sandbox gateway and a
/// clock that only moves when the test says so.
pub struct Harness {
  pub state: AppState,
  pub store: Arc<MemoryStore>,
  pub sandbox: Arc<SandboxGateway>,
  pub clock: Arc<ManualClock>,
}

impl Harness {
  /// A second process over the same data: fresh retry queue and saga registry.
  pub fn restart(&self) -> AppState {
    AppState::with_sandbox(
      StoreHandles::from_memory(self.store.clone()),
      self.sandbox.clone(),
      self.clock.clone(),
      (*self.state.config).clone(),
    )
  }

  pub fn now(&self) -> DateTime<Utc> {
    use storefront::services::clock::Clock;
    self.clock.now()
  }
}

pub fn start_time() -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
}

pub fn harness() -> Harness {
  harness_with(AppConfig::local_defaults())
}

pub fn harness_with(config: AppConfig) -> Harness {
  let store = Arc::new(MemoryStore::new());
  let clock = Arc::new(ManualClock::new(start_time()));
  let sandbox = Arc::new(SandboxGateway::new(config.qr_ttl()));
  let state = AppState::with_sandbox(
    StoreHandles::from_memory(store.clone()),
    sandbox.clone(),
    clock.clone(),
    config,
  );
  Harness {
    state,
    store,
    sandbox,
    clock,
  }
}

pub fn line(variant_id: Uuid, quantity: i32, unit_price: i64) -> CheckoutLine {
  CheckoutLine {
    variant_id,
    product_id: Uuid::new_v4(),
    product_name: "Linen shirt".to_string(),
    color_id: None,
    size_id: None,
    quantity,
    unit_price,
    discount_percentage: 0,
  }
}

/// USD checkout whose totals add up.
pub fn checkout_request(lines: Vec<CheckoutLine>) -> CheckoutRequest {
  // Saturates so oversized lines still build a request for validation to refuse.
  let subtotal: i64 = lines
    .iter()
    .map(|l| {
      storefront::models::money::discounted_line_total(l.quantity, l.unit_price, l.discount_percentage)
        .unwrap_or(i64::MAX)
    })
    .fold(0, i64::saturating_add);
  CheckoutRequest {
    customer_id: None,
    cart_items: lines,
    subtotal,
    discount_amount: 0,
    total_amount: subtotal,
    promo_code_id: None,
    shipping_address: json!({ "line1": "12 Norodom Blvd", "city": "Phnom Penh" }),
    currency: Currency::Usd,
  }
}

pub fn with_promo(mut req: CheckoutRequest, promo_code_id: Uuid, discount_amount: i64) -> CheckoutRequest {
  req.promo_code_id = Some(promo_code_id);
  req.discount_amount = discount_amount;
  req.total_amount = req.subtotal - discount_amount;
  req
}

pub fn coupon(code: &str, percentage: i32, now: DateTime<Utc>) -> PromoCode {
  PromoCode {
    id: Uuid::new_v4(),
    code: code.to_string(),
    discount_percentage: percentage,
    is_active: true,
    valid_from: now - Duration::days(1),
    valid_until: Some(now + Duration::days(30)),
    max_total_uses: Some(100),
    current_uses: 0,
    max_uses_per_customer: Some(1),
    deleted_at: None,
  }
}

/// Places a one-line order for `quantity` units of a fresh variant.
pub async fn place_simple_order(h: &Harness, customer_id: Uuid, stock: i32, quantity: i32) -> (Uuid, CheckoutReceipt) {
  let variant = h.store.seed_variant(stock);
  let receipt = place_order(
    &h.state,
    Some(customer_id),
    checkout_request(vec![line(variant, quantity, 2500)]),
  )
  .await
  .expect("checkout should succeed");
  (variant, receipt)
}

static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}
