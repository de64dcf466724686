// storefront/src/web/routes.rs

use actix_web::web;

use crate::web::handlers::{
  admin_handlers, cart_handlers, checkout_handlers, coupon_handlers, order_handlers, payment_handlers,
  sandbox_handlers, webhook_handlers,
};

async fn health_check_handler() -> actix_web::HttpResponse {
  actix_web::HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

/// Builds the `/api/v1` route table. The sandbox settlement route exists only
/// when `sandbox_enabled` is set, so a live deployment never exposes it.
pub fn configure_app_routes(sandbox_enabled: bool) -> impl FnOnce(&mut web::ServiceConfig) {
  move |cfg: &mut web::ServiceConfig| {
    let mut api = web::scope("/api/v1")
      .route("/health", web::get().to(health_check_handler))
      .route("/checkout", web::post().to(checkout_handlers::checkout_handler))
      .route(
        "/payments/{transaction_id}/status",
        web::get().to(payment_handlers::payment_status_handler),
      )
      .service(
        web::scope("/orders")
          .route(
            "/{order_id}/payments",
            web::post().to(payment_handlers::renew_payment_handler),
          )
          .route(
            "/{order_id}/history",
            web::get().to(order_handlers::order_history_handler),
          ),
      )
      .route(
        "/webhooks/payments",
        web::post().to(webhook_handlers::payment_webhook_handler),
      )
      .route(
        "/coupons/validate",
        web::post().to(coupon_handlers::validate_coupon_handler),
      )
      .service(
        web::scope("/cart")
          .route("", web::get().to(cart_handlers::get_cart_handler))
          .route(
            "/items/{variant_id}",
            web::put().to(cart_handlers::set_cart_quantity_handler),
          ),
      )
      .route(
        "/admin/orders/{order_id}/status",
        web::put().to(admin_handlers::update_order_status_handler),
      );
    if sandbox_enabled {
      api = api.route(
        "/sandbox/settlements/{settlement_hash}",
        web::post().to(sandbox_handlers::sandbox_settle_handler),
      );
    }
    cfg.service(api);
  }
}
