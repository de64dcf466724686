// storefront/src/db/mod.rs

//! Repository traits for the storefront and their two backends.
//!
//! Every method that guards an invariant (payment claims, order payment state,
//! cart versions, business status) is a single conditional write in both
//! backends. Callers never read-then-write.

pub mod memory;
pub mod postgres;

use crate::models::{
  CartItem, Effect, EffectState, Order, OrderItem, OrderStatus, PaymentTransaction, StatusHistoryEntry,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub use memory::{FaultPoint, MemoryStore};
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("Database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("Duplicate record: {0}")]
  Duplicate(String),

  #[error("Version conflict (current version: {current_version:?})")]
  VersionConflict { current_version: Option<i64> },

  #[error("Record not found: {0}")]
  NotFound(String),

  /// The backend refused the operation. Raised by fault injection in tests and
  /// treated as transient everywhere.
  #[error("Store unavailable: {0}")]
  Unavailable(String),
}

/// Result of trying to move a transaction INITIATED -> COMPLETED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
  /// This caller won the claim.
  Completed,
  /// The transaction had already left INITIATED.
  NotInitiated,
  /// The transaction's deadline had passed; it was not completed.
  Expired,
  /// Another transaction of the same order is already COMPLETED.
  OrderAlreadySettled,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
  async fn order_number_exists(&self, order_number: &str) -> Result<bool, StoreError>;

  /// Fails with `StoreError::Duplicate` when the order number is taken.
  async fn insert_order(&self, order: &Order) -> Result<(), StoreError>;

  /// All-or-nothing batch insert.
  async fn insert_order_items(&self, items: &[OrderItem]) -> Result<(), StoreError>;

  /// Removes the order with its items and transactions. Compensation only.
  async fn delete_order(&self, order_id: Uuid) -> Result<(), StoreError>;

  async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError>;

  async fn list_order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, StoreError>;

  /// Conditional PENDING -> PAID. Returns `false` when the order was already paid.
  async fn mark_order_paid(&self, order_id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError>;

  async fn set_effect_state(&self, order_id: Uuid, effect: Effect, state: EffectState) -> Result<(), StoreError>;

  /// Conditional status write from `from` to `to`. Returns `false` when the
  /// stored status no longer equals `from`.
  async fn update_status(
    &self,
    order_id: Uuid,
    from: OrderStatus,
    to: OrderStatus,
    now: DateTime<Utc>,
  ) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
  async fn insert_transaction(&self, txn: &PaymentTransaction) -> Result<(), StoreError>;

  async fn get_transaction(&self, transaction_id: Uuid) -> Result<Option<PaymentTransaction>, StoreError>;

  async fn find_by_settlement_hash(&self, settlement_hash: &str) -> Result<Option<PaymentTransaction>, StoreError>;

  async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<PaymentTransaction>, StoreError>;

  /// Conditional INITIATED -> COMPLETED, guarded by `expires_at > now` and by
  /// no other COMPLETED transaction existing for the order.
  async fn complete_transaction(
    &self,
    transaction_id: Uuid,
    now: DateTime<Utc>,
    gateway_response: serde_json::Value,
  ) -> Result<CompletionOutcome, StoreError>;

  /// Conditional INITIATED -> EXPIRED.
  async fn expire_transaction(&self, transaction_id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError>;

  /// Conditional INITIATED -> FAILED.
  async fn fail_transaction(
    &self,
    transaction_id: Uuid,
    now: DateTime<Utc>,
    gateway_response: serde_json::Value,
  ) -> Result<bool, StoreError>;

  /// COMPLETED transactions whose order still has effects in PENDING.
  async fn completed_awaiting_effects(&self) -> Result<Vec<PaymentTransaction>, StoreError>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
  async fn list_cart(&self, customer_id: Uuid) -> Result<Vec<CartItem>, StoreError>;

  /// Versioned write. `expected_version = None` asserts the line does not exist
  /// yet. A quantity of zero removes the line and returns `None`.
  async fn set_quantity(
    &self,
    customer_id: Uuid,
    variant_id: Uuid,
    quantity: i32,
    expected_version: Option<i64>,
    now: DateTime<Utc>,
  ) -> Result<Option<CartItem>, StoreError>;

  async fn clear_cart(&self, customer_id: Uuid) -> Result<u64, StoreError>;
}

/// Append-only audit trail of order state changes.
#[async_trait]
pub trait StatusJournal: Send + Sync {
  async fn append(&self, entry: &StatusHistoryEntry) -> Result<(), StoreError>;

  async fn history(&self, order_id: Uuid) -> Result<Vec<StatusHistoryEntry>, StoreError>;
}
