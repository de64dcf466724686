// tests/http_api_tests.rs
mod common;

use actix_web::{http::StatusCode, test, web, App};
use common::*;
use serde_json::{json, Value};
use serial_test::serial;
use storefront::config::AppConfig;
use storefront::models::TransactionStatus;
use storefront::pipelines::reconcile_pipeline::check_payment_status;
use storefront::state::{AppState, StoreHandles};
use storefront::web::configure_app_routes;
use uuid::Uuid;

macro_rules! init_app {
  ($state:expr) => {
    test::init_service(
      App::new()
        .app_data(web::Data::new($state.clone()))
        .configure(configure_app_routes($state.sandbox.is_some())),
    )
    .await
  };
}

fn checkout_body(variant_id: Uuid, quantity: i32, unit_price: i64) -> Value {
  let total = i64::from(quantity) * unit_price;
  json!({
    "cartItems": [{
      "variantId": variant_id,
      "productId": Uuid::new_v4(),
      "productName": "Denim jacket",
      "quantity": quantity,
      "unitPrice": unit_price,
      "discountPercentage": 0
    }],
    "subtotal": total,
    "discountAmount": 0,
    "totalAmount": total,
    "shippingAddress": { "line1": "1 Riverside", "city": "Phnom Penh" },
    "currency": "USD"
  })
}

#[actix_web::test]
#[serial]
async fn test_health_check() {
  setup_tracing();
  let h = harness();
  let app = init_app!(h.state);
  let resp = test::call_service(&app, test::TestRequest::get().uri("/api/v1/health").to_request()).await;
  assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
#[serial]
async fn test_checkout_requires_identity() {
  setup_tracing();
  let h = harness();
  let variant = h.store.seed_variant(5);
  let app = init_app!(h.state);

  let req = test::TestRequest::post()
    .uri("/api/v1/checkout")
    .set_json(checkout_body(variant, 1, 1000))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
#[serial]
async fn test_checkout_then_settle_through_http() {
  setup_tracing();
  let h = harness();
  let variant = h.store.seed_variant(5);
  let customer = Uuid::new_v4().to_string();
  let app = init_app!(h.state);

  let req = test::TestRequest::post()
    .uri("/api/v1/checkout")
    .insert_header(("X-Customer-Id", customer.as_str()))
    .set_json(checkout_body(variant, 1, 10_000))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["success"], true);
  assert_eq!(body["order"]["totalAmount"], 10_000);
  let txn_id = body["paymentData"]["transactionId"].as_str().unwrap().to_string();
  let hash = body["paymentData"]["settlementHash"].as_str().unwrap().to_string();

  let status_uri = format!("/api/v1/payments/{}/status", txn_id);
  let req = test::TestRequest::get()
    .uri(&status_uri)
    .insert_header(("X-Customer-Id", customer.as_str()))
    .to_request();
  let body: Value = test::call_and_read_body_json(&app, req).await;
  assert_eq!(body["status"], "INITIATED");

  // Someone else's transaction is invisible.
  let req = test::TestRequest::get()
    .uri(&status_uri)
    .insert_header(("X-Customer-Id", Uuid::new_v4().to_string()))
    .to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

  let req = test::TestRequest::post()
    .uri(&format!("/api/v1/sandbox/settlements/{}", hash))
    .to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::ACCEPTED);

  let req = test::TestRequest::get()
    .uri(&status_uri)
    .insert_header(("X-Customer-Id", customer.as_str()))
    .to_request();
  let body: Value = test::call_and_read_body_json(&app, req).await;
  assert_eq!(body["status"], "COMPLETED");
  assert_eq!(h.store.stock_of(variant), Some(4));
}

#[actix_web::test]
#[serial]
async fn test_sandbox_settlement_route_is_absent_with_live_gateway() {
  setup_tracing();
  let h = harness();
  let (_, receipt) = place_simple_order(&h, Uuid::new_v4(), 3, 1).await;
  // Same data, but the sandbox is only the gateway, not an exposed simulator.
  let live_state = AppState::new(
    StoreHandles::from_memory(h.store.clone()),
    h.sandbox.clone(),
    None,
    h.clock.clone(),
    AppConfig::local_defaults(),
  );
  let app = init_app!(live_state);

  let req = test::TestRequest::post()
    .uri(&format!(
      "/api/v1/sandbox/settlements/{}",
      receipt.payment_data.settlement_hash
    ))
    .insert_header(("X-Customer-Id", Uuid::new_v4().to_string()))
    .to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

  let txn = check_payment_status(&live_state, receipt.payment_data.transaction_id)
    .await
    .unwrap();
  assert_eq!(txn.status, TransactionStatus::Initiated);
}

#[actix_web::test]
#[serial]
async fn test_checkout_with_oversized_amounts_is_a_bad_request() {
  setup_tracing();
  let h = harness();
  let variant = h.store.seed_variant(5);
  let app = init_app!(h.state);

  let body = json!({
    "cartItems": [{
      "variantId": variant,
      "productId": Uuid::new_v4(),
      "productName": "Gold-thread sarong",
      "quantity": 20,
      "unitPrice": i64::MAX / 10,
      "discountPercentage": 0
    }],
    "subtotal": 1000,
    "discountAmount": 0,
    "totalAmount": 1000,
    "shippingAddress": { "line1": "1 Riverside", "city": "Phnom Penh" },
    "currency": "USD"
  });
  let req = test::TestRequest::post()
    .uri("/api/v1/checkout")
    .insert_header(("X-Customer-Id", Uuid::new_v4().to_string()))
    .set_json(body)
    .to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
  assert_eq!(h.store.order_count(), 0);
  assert_eq!(h.store.stock_of(variant), Some(5));
}

#[actix_web::test]
#[serial]
async fn test_out_of_stock_response_lists_shortages() {
  setup_tracing();
  let h = harness();
  let variant = h.store.seed_variant(1);
  let app = init_app!(h.state);

  let req = test::TestRequest::post()
    .uri("/api/v1/checkout")
    .insert_header(("X-Customer-Id", Uuid::new_v4().to_string()))
    .set_json(checkout_body(variant, 3, 1000))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::CONFLICT);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["outOfStock"][0]["available"], 1);
  assert_eq!(body["outOfStock"][0]["requested"], 3);
}

#[actix_web::test]
#[serial]
async fn test_cart_version_conflict_reports_current_version() {
  setup_tracing();
  let h = harness();
  let customer = Uuid::new_v4().to_string();
  let variant = Uuid::new_v4();
  let app = init_app!(h.state);
  let uri = format!("/api/v1/cart/items/{}", variant);

  let req = test::TestRequest::put()
    .uri(&uri)
    .insert_header(("X-Customer-Id", customer.as_str()))
    .set_json(json!({ "quantity": 2 }))
    .to_request();
  let body: Value = test::call_and_read_body_json(&app, req).await;
  assert_eq!(body["cartItem"]["version"], 1);

  let req = test::TestRequest::put()
    .uri(&uri)
    .insert_header(("X-Customer-Id", customer.as_str()))
    .set_json(json!({ "quantity": 4, "version": 7 }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::CONFLICT);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["currentVersion"], 1);

  let req = test::TestRequest::get()
    .uri("/api/v1/cart")
    .insert_header(("X-Customer-Id", customer.as_str()))
    .to_request();
  let body: Value = test::call_and_read_body_json(&app, req).await;
  assert_eq!(body["items"][0]["quantity"], 2);
}

#[actix_web::test]
#[serial]
async fn test_coupon_validation_endpoint() {
  setup_tracing();
  let h = harness();
  h.store.seed_coupon(coupon("AUTUMN", 15, h.now()));
  let app = init_app!(h.state);

  let req = test::TestRequest::post()
    .uri("/api/v1/coupons/validate")
    .insert_header(("X-Customer-Id", Uuid::new_v4().to_string()))
    .set_json(json!({ "code": "autumn" }))
    .to_request();
  let body: Value = test::call_and_read_body_json(&app, req).await;
  assert_eq!(body["valid"], true);
  assert_eq!(body["promoCode"]["discountPercentage"], 15);

  let req = test::TestRequest::post()
    .uri("/api/v1/coupons/validate")
    .insert_header(("X-Customer-Id", Uuid::new_v4().to_string()))
    .set_json(json!({ "code": "WINTER" }))
    .to_request();
  let body: Value = test::call_and_read_body_json(&app, req).await;
  assert_eq!(body["valid"], false);
  assert_eq!(body["reason"], "NOT_FOUND");
}

#[actix_web::test]
#[serial]
async fn test_webhook_requires_configured_secret() {
  setup_tracing();
  let mut config = AppConfig::local_defaults();
  config.webhook_secret = Some("s3cret".to_string());
  let h = harness_with(config);
  let (_, receipt) = place_simple_order(&h, Uuid::new_v4(), 5, 1).await;
  h.sandbox.settle(&receipt.payment_data.settlement_hash);
  let app = init_app!(h.state);
  let payload = json!({ "settlementHash": receipt.payment_data.settlement_hash });

  let req = test::TestRequest::post()
    .uri("/api/v1/webhooks/payments")
    .insert_header(("X-Webhook-Secret", "wrong"))
    .set_json(&payload)
    .to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

  let req = test::TestRequest::post()
    .uri("/api/v1/webhooks/payments")
    .insert_header(("X-Webhook-Secret", "s3cret"))
    .set_json(&payload)
    .to_request();
  let body: Value = test::call_and_read_body_json(&app, req).await;
  assert_eq!(body["status"], "COMPLETED");
}

#[actix_web::test]
#[serial]
async fn test_admin_status_update_requires_admin_role() {
  setup_tracing();
  let h = harness();
  let (_, receipt) = place_simple_order(&h, Uuid::new_v4(), 5, 1).await;
  let app = init_app!(h.state);
  let uri = format!("/api/v1/admin/orders/{}/status", receipt.order.id);

  let req = test::TestRequest::put()
    .uri(&uri)
    .insert_header(("X-Customer-Id", Uuid::new_v4().to_string()))
    .set_json(json!({ "status": "CONFIRMED" }))
    .to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

  let req = test::TestRequest::put()
    .uri(&uri)
    .insert_header(("X-Customer-Id", Uuid::new_v4().to_string()))
    .insert_header(("X-Customer-Role", "admin"))
    .set_json(json!({ "status": "CONFIRMED", "note": "Stock checked" }))
    .to_request();
  let body: Value = test::call_and_read_body_json(&app, req).await;
  assert_eq!(body["order"]["status"], "CONFIRMED");

  let req = test::TestRequest::put()
    .uri(&uri)
    .insert_header(("X-Customer-Id", Uuid::new_v4().to_string()))
    .insert_header(("X-Customer-Role", "admin"))
    .set_json(json!({ "status": "PENDING" }))
    .to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}
