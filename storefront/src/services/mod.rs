// storefront/src/services/mod.rs

//! Domain services: ledgers, payment gateway adapters and background workers.

pub mod clock;
pub mod coupon_ledger;
pub mod emv_qr;
pub mod gateway_http;
pub mod order_number;
pub mod payment_gateway;
pub mod payment_sandbox;
pub mod settlement_worker;
pub mod stock_ledger;
