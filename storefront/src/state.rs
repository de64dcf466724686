// storefront/src/state.rs

use crate::config::AppConfig;
use crate::db::{CartStore, MemoryStore, OrderStore, PaymentStore, PgStore, StatusJournal};
use crate::errors::AppError;
use crate::services::clock::Clock;
use crate::services::coupon_ledger::CouponLedger;
use crate::services::payment_gateway::PaymentGateway;
use crate::services::payment_sandbox::SandboxGateway;
use crate::services::settlement_worker::{RetryPolicy, RetryQueue};
use crate::services::stock_ledger::StockLedger;
use seamline::SagaRegistry;
use std::sync::Arc;

/// One handle per repository trait. Both backends implement all of them.
#[derive(Clone)]
pub struct StoreHandles {
  pub orders: Arc<dyn OrderStore>,
  pub payments: Arc<dyn PaymentStore>,
  pub carts: Arc<dyn CartStore>,
  pub journal: Arc<dyn StatusJournal>,
  pub stock: Arc<dyn StockLedger>,
  pub coupons: Arc<dyn CouponLedger>,
}

impl StoreHandles {
  pub fn from_memory(store: Arc<MemoryStore>) -> Self {
    Self {
      orders: store.clone(),
      payments: store.clone(),
      carts: store.clone(),
      journal: store.clone(),
      stock: store.clone(),
      coupons: store,
    }
  }

  pub fn from_postgres(store: PgStore) -> Self {
    let store = Arc::new(store);
    Self {
      orders: store.clone(),
      payments: store.clone(),
      carts: store.clone(),
      journal: store.clone(),
      stock: store.clone(),
      coupons: store,
    }
  }
}

#[derive(Clone)]
pub struct AppState {
  pub orders: Arc<dyn OrderStore>,
  pub payments: Arc<dyn PaymentStore>,
  pub carts: Arc<dyn CartStore>,
  pub journal: Arc<dyn StatusJournal>,
  pub stock: Arc<dyn StockLedger>,
  pub coupons: Arc<dyn CouponLedger>,
  pub gateway: Arc<dyn PaymentGateway>,
  /// Present only when the sandbox gateway is in use.
  pub sandbox: Option<Arc<SandboxGateway>>,
  pub clock: Arc<dyn Clock>,
  pub sagas: Arc<SagaRegistry<AppError>>,
  pub retries: RetryQueue,
  pub config: Arc<AppConfig>,
}

impl AppState {
  /// Builds the state and registers every saga.
  pub fn new(
    stores: StoreHandles,
    gateway: Arc<dyn PaymentGateway>,
    sandbox: Option<Arc<SandboxGateway>>,
    clock: Arc<dyn Clock>,
    config: AppConfig,
  ) -> Self {
    let sagas = Arc::new(SagaRegistry::<AppError>::new());
    crate::pipelines::register_all_pipelines(&sagas);
    let retries = RetryQueue::new(RetryPolicy::from_config(&config));
    Self {
      orders: stores.orders,
      payments: stores.payments,
      carts: stores.carts,
      journal: stores.journal,
      stock: stores.stock,
      coupons: stores.coupons,
      gateway,
      sandbox,
      clock,
      sagas,
      retries,
      config: Arc::new(config),
    }
  }

  pub fn with_sandbox(stores: StoreHandles, sandbox: Arc<SandboxGateway>, clock: Arc<dyn Clock>, config: AppConfig) -> Self {
    Self::new(stores, sandbox.clone(), Some(sandbox), clock, config)
  }
}
