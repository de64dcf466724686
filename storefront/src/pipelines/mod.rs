// storefront/src/pipelines/mod.rs

//! Sagas of the storefront and the operations that run them.

use crate::errors::AppError;
use seamline::SagaRegistry;

pub mod common_steps;
pub mod contexts;

pub mod checkout_pipeline;
pub mod order_status;
pub mod reconcile_pipeline;
pub mod renew_payment_pipeline;
pub mod settlement_effects;

/// Registers every saga. Called once while building `AppState`.
pub fn register_all_pipelines(registry: &SagaRegistry<AppError>) {
  tracing::info!("Registering sagas...");

  checkout_pipeline::register_checkout_pipeline(registry);
  reconcile_pipeline::register_reconcile_pipeline(registry);
  renew_payment_pipeline::register_renew_payment_pipeline(registry);

  tracing::info!("All sagas registered.");
}
