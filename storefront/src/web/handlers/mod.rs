// storefront/src/web/handlers/mod.rs

pub mod admin_handlers;
pub mod cart_handlers;
pub mod checkout_handlers;
pub mod coupon_handlers;
pub mod order_handlers;
pub mod payment_handlers;
pub mod sandbox_handlers;
pub mod webhook_handlers;
