// storefront/src/db/memory.rs

//! In-memory backend. Every table sits behind one mutex, so each trait method
//! is atomic. Used for local development and tests, with deterministic fault
//! injection.

use super::{CartStore, CompletionOutcome, OrderStore, PaymentStore, StatusJournal, StoreError};
use crate::models::{
  CartItem, Effect, EffectState, Order, OrderItem, OrderStatus, PaymentStatus, PaymentTransaction, PromoCode,
  PromoCodeUsage, StatusHistoryEntry, TransactionStatus,
};
use crate::services::coupon_ledger::{CouponLedger, UsageRecord};
use crate::services::stock_ledger::{
  ensure_positive, merge_lines, shortages, LedgerError, StockCommit, StockLedger, StockLine,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

/// Operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
  InsertOrder,
  InsertOrderItems,
  DeleteOrder,
  InsertTransaction,
  MarkOrderPaid,
  SetEffectState,
  DecrementStock,
  RecordCouponUsage,
  ClearCart,
  AppendHistory,
}

#[derive(Default)]
struct Tables {
  orders: HashMap<Uuid, Order>,
  order_items: HashMap<Uuid, Vec<OrderItem>>,
  transactions: HashMap<Uuid, PaymentTransaction>,
  carts: HashMap<(Uuid, Uuid), CartItem>,
  history: Vec<StatusHistoryEntry>,
  stock: HashMap<Uuid, i32>,
  stock_commits: HashSet<Uuid>,
  coupons: HashMap<Uuid, PromoCode>,
  usages: Vec<PromoCodeUsage>,
}

#[derive(Default)]
pub struct MemoryStore {
  tables: Mutex<Tables>,
  faults: Mutex<HashMap<FaultPoint, u32>>,
  decrements: AtomicUsize,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Makes the next `times` calls at `point` fail with `StoreError::Unavailable`.
  pub fn fail_next(&self, point: FaultPoint, times: u32) {
    self.faults.lock().insert(point, times);
  }

  fn trip(&self, point: FaultPoint) -> Result<(), StoreError> {
    let mut faults = self.faults.lock();
    match faults.get_mut(&point) {
      Some(left) if *left > 0 => {
        *left -= 1;
        Err(StoreError::Unavailable(format!("injected fault at {:?}", point)))
      }
      _ => Ok(()),
    }
  }

  pub fn seed_variant(&self, quantity: i32) -> Uuid {
    let id = Uuid::new_v4();
    self.tables.lock().stock.insert(id, quantity);
    id
  }

  pub fn stock_of(&self, variant_id: Uuid) -> Option<i32> {
    self.tables.lock().stock.get(&variant_id).copied()
  }

  pub fn seed_coupon(&self, coupon: PromoCode) {
    self.tables.lock().coupons.insert(coupon.id, coupon);
  }

  pub fn coupon(&self, promo_code_id: Uuid) -> Option<PromoCode> {
    self.tables.lock().coupons.get(&promo_code_id).cloned()
  }

  pub fn usage_count(&self, promo_code_id: Uuid) -> usize {
    self.tables.lock().usages.iter().filter(|u| u.promo_code_id == promo_code_id).count()
  }

  pub fn order_count(&self) -> usize {
    self.tables.lock().orders.len()
  }

  pub fn item_count(&self) -> usize {
    self.tables.lock().order_items.values().map(Vec::len).sum()
  }

  pub fn transaction_count(&self) -> usize {
    self.tables.lock().transactions.len()
  }

  fn apply_decrement(&self, t: &mut Tables, items: &[StockLine]) -> Result<(), LedgerError> {
    let merged = merge_lines(items)?;
    let short = shortages(&merged, &t.stock);
    if !short.is_empty() {
      return Err(LedgerError::InsufficientStock(short));
    }
    for line in &merged {
      if let Some(q) = t.stock.get_mut(&line.variant_id) {
        *q -= line.quantity;
      }
    }
    self.decrements.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }

  /// Number of decrements that actually changed stock.
  pub fn successful_decrements(&self) -> usize {
    self.decrements.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl OrderStore for MemoryStore {
  async fn order_number_exists(&self, order_number: &str) -> Result<bool, StoreError> {
    Ok(self.tables.lock().orders.values().any(|o| o.order_number == order_number))
  }

  async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
    self.trip(FaultPoint::InsertOrder)?;
    let mut t = self.tables.lock();
    if t.orders.values().any(|o| o.order_number == order.order_number) {
      return Err(StoreError::Duplicate(format!("order_number {}", order.order_number)));
    }
    t.orders.insert(order.id, order.clone());
    Ok(())
  }

  async fn insert_order_items(&self, items: &[OrderItem]) -> Result<(), StoreError> {
    self.trip(FaultPoint::InsertOrderItems)?;
    let mut t = self.tables.lock();
    if let Some(orphan) = items.iter().find(|i| !t.orders.contains_key(&i.order_id)) {
      return Err(StoreError::NotFound(format!("order {}", orphan.order_id)));
    }
    for item in items {
      t.order_items.entry(item.order_id).or_default().push(item.clone());
    }
    Ok(())
  }

  async fn delete_order(&self, order_id: Uuid) -> Result<(), StoreError> {
    self.trip(FaultPoint::DeleteOrder)?;
    let mut t = self.tables.lock();
    t.orders.remove(&order_id);
    t.order_items.remove(&order_id);
    t.transactions.retain(|_, txn| txn.order_id != order_id);
    Ok(())
  }

  async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
    Ok(self.tables.lock().orders.get(&order_id).cloned())
  }

  async fn list_order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, StoreError> {
    Ok(self.tables.lock().order_items.get(&order_id).cloned().unwrap_or_default())
  }

  async fn mark_order_paid(&self, order_id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
    self.trip(FaultPoint::MarkOrderPaid)?;
    let mut t = self.tables.lock();
    let order = t
      .orders
      .get_mut(&order_id)
      .ok_or_else(|| StoreError::NotFound(format!("order {}", order_id)))?;
    if order.payment_status == PaymentStatus::Paid {
      return Ok(false);
    }
    order.payment_status = PaymentStatus::Paid;
    order.paid_at = Some(now);
    order.updated_at = now;
    Ok(true)
  }

  async fn set_effect_state(&self, order_id: Uuid, effect: Effect, state: EffectState) -> Result<(), StoreError> {
    self.trip(FaultPoint::SetEffectState)?;
    let mut t = self.tables.lock();
    let order = t
      .orders
      .get_mut(&order_id)
      .ok_or_else(|| StoreError::NotFound(format!("order {}", order_id)))?;
    order.effects.set(effect, state);
    Ok(())
  }

  async fn update_status(
    &self,
    order_id: Uuid,
    from: OrderStatus,
    to: OrderStatus,
    now: DateTime<Utc>,
  ) -> Result<bool, StoreError> {
    let mut t = self.tables.lock();
    match t.orders.get_mut(&order_id) {
      Some(order) if order.status == from => {
        order.status = to;
        order.updated_at = now;
        Ok(true)
      }
      Some(_) => Ok(false),
      None => Err(StoreError::NotFound(format!("order {}", order_id))),
    }
  }
}

#[async_trait]
impl PaymentStore for MemoryStore {
  async fn insert_transaction(&self, txn: &PaymentTransaction) -> Result<(), StoreError> {
    self.trip(FaultPoint::InsertTransaction)?;
    let mut t = self.tables.lock();
    if !t.orders.contains_key(&txn.order_id) {
      return Err(StoreError::NotFound(format!("order {}", txn.order_id)));
    }
    if t.transactions.values().any(|x| x.settlement_hash == txn.settlement_hash) {
      return Err(StoreError::Duplicate(format!("settlement_hash {}", txn.settlement_hash)));
    }
    t.transactions.insert(txn.id, txn.clone());
    Ok(())
  }

  async fn get_transaction(&self, transaction_id: Uuid) -> Result<Option<PaymentTransaction>, StoreError> {
    Ok(self.tables.lock().transactions.get(&transaction_id).cloned())
  }

  async fn find_by_settlement_hash(&self, settlement_hash: &str) -> Result<Option<PaymentTransaction>, StoreError> {
    Ok(
      self
        .tables
        .lock()
        .transactions
        .values()
        .find(|t| t.settlement_hash == settlement_hash)
        .cloned(),
    )
  }

  async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<PaymentTransaction>, StoreError> {
    let mut found: Vec<PaymentTransaction> = self
      .tables
      .lock()
      .transactions
      .values()
      .filter(|t| t.order_id == order_id)
      .cloned()
      .collect();
    found.sort_by_key(|t| t.created_at);
    Ok(found)
  }

  async fn complete_transaction(
    &self,
    transaction_id: Uuid,
    now: DateTime<Utc>,
    gateway_response: serde_json::Value,
  ) -> Result<CompletionOutcome, StoreError> {
    let mut t = self.tables.lock();
    let (order_id, status, expires_at) = match t.transactions.get(&transaction_id) {
      Some(txn) => (txn.order_id, txn.status, txn.expires_at),
      None => return Err(StoreError::NotFound(format!("transaction {}", transaction_id))),
    };
    if status != TransactionStatus::Initiated {
      return Ok(CompletionOutcome::NotInitiated);
    }
    if expires_at <= now {
      return Ok(CompletionOutcome::Expired);
    }
    let sibling_completed = t
      .transactions
      .values()
      .any(|x| x.order_id == order_id && x.status == TransactionStatus::Completed);
    if sibling_completed {
      return Ok(CompletionOutcome::OrderAlreadySettled);
    }
    if let Some(txn) = t.transactions.get_mut(&transaction_id) {
      txn.status = TransactionStatus::Completed;
      txn.completed_at = Some(now);
      txn.updated_at = now;
      txn.gateway_response = Some(gateway_response);
    }
    Ok(CompletionOutcome::Completed)
  }

  async fn expire_transaction(&self, transaction_id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
    let mut t = self.tables.lock();
    match t.transactions.get_mut(&transaction_id) {
      Some(txn) if txn.status == TransactionStatus::Initiated => {
        txn.status = TransactionStatus::Expired;
        txn.updated_at = now;
        Ok(true)
      }
      Some(_) => Ok(false),
      None => Err(StoreError::NotFound(format!("transaction {}", transaction_id))),
    }
  }

  async fn fail_transaction(
    &self,
    transaction_id: Uuid,
    now: DateTime<Utc>,
    gateway_response: serde_json::Value,
  ) -> Result<bool, StoreError> {
    let mut t = self.tables.lock();
    match t.transactions.get_mut(&transaction_id) {
      Some(txn) if txn.status == TransactionStatus::Initiated => {
        txn.status = TransactionStatus::Failed;
        txn.updated_at = now;
        txn.gateway_response = Some(gateway_response);
        Ok(true)
      }
      Some(_) => Ok(false),
      None => Err(StoreError::NotFound(format!("transaction {}", transaction_id))),
    }
  }

  async fn completed_awaiting_effects(&self) -> Result<Vec<PaymentTransaction>, StoreError> {
    let t = self.tables.lock();
    Ok(
      t.transactions
        .values()
        .filter(|txn| txn.status == TransactionStatus::Completed)
        .filter(|txn| t.orders.get(&txn.order_id).is_some_and(|o| !o.effects.all_settled()))
        .cloned()
        .collect(),
    )
  }
}

#[async_trait]
impl CartStore for MemoryStore {
  async fn list_cart(&self, customer_id: Uuid) -> Result<Vec<CartItem>, StoreError> {
    let mut items: Vec<CartItem> = self
      .tables
      .lock()
      .carts
      .values()
      .filter(|c| c.customer_id == customer_id)
      .cloned()
      .collect();
    items.sort_by_key(|c| c.updated_at);
    Ok(items)
  }

  async fn set_quantity(
    &self,
    customer_id: Uuid,
    variant_id: Uuid,
    quantity: i32,
    expected_version: Option<i64>,
    now: DateTime<Utc>,
  ) -> Result<Option<CartItem>, StoreError> {
    let mut t = self.tables.lock();
    let key = (customer_id, variant_id);
    let current_version = t.carts.get(&key).map(|c| c.version);
    if current_version != expected_version {
      return Err(StoreError::VersionConflict { current_version });
    }
    if quantity == 0 {
      t.carts.remove(&key);
      return Ok(None);
    }
    let item = t.carts.entry(key).or_insert_with(|| CartItem {
      id: Uuid::new_v4(),
      customer_id,
      variant_id,
      quantity: 0,
      version: 0,
      updated_at: now,
    });
    item.quantity = quantity;
    item.version += 1;
    item.updated_at = now;
    Ok(Some(item.clone()))
  }

  async fn clear_cart(&self, customer_id: Uuid) -> Result<u64, StoreError> {
    self.trip(FaultPoint::ClearCart)?;
    let mut t = self.tables.lock();
    let before = t.carts.len();
    t.carts.retain(|(owner, _), _| *owner != customer_id);
    Ok((before - t.carts.len()) as u64)
  }
}

#[async_trait]
impl StatusJournal for MemoryStore {
  async fn append(&self, entry: &StatusHistoryEntry) -> Result<(), StoreError> {
    self.trip(FaultPoint::AppendHistory)?;
    self.tables.lock().history.push(entry.clone());
    Ok(())
  }

  async fn history(&self, order_id: Uuid) -> Result<Vec<StatusHistoryEntry>, StoreError> {
    Ok(
      self
        .tables
        .lock()
        .history
        .iter()
        .filter(|e| e.order_id == order_id)
        .cloned()
        .collect(),
    )
  }
}

#[async_trait]
impl StockLedger for MemoryStore {
  async fn quantities(&self, variant_ids: &[Uuid]) -> Result<HashMap<Uuid, i32>, StoreError> {
    let t = self.tables.lock();
    Ok(
      variant_ids
        .iter()
        .filter_map(|id| t.stock.get(id).map(|q| (*id, *q)))
        .collect(),
    )
  }

  async fn decrement(&self, items: &[StockLine]) -> Result<(), LedgerError> {
    ensure_positive(items)?;
    self.trip(FaultPoint::DecrementStock)?;
    let mut t = self.tables.lock();
    self.apply_decrement(&mut t, items)
  }

  async fn commit_for_order(&self, order_id: Uuid, items: &[StockLine]) -> Result<StockCommit, LedgerError> {
    ensure_positive(items)?;
    self.trip(FaultPoint::DecrementStock)?;
    let mut t = self.tables.lock();
    if t.stock_commits.contains(&order_id) {
      return Ok(StockCommit::AlreadyCommitted);
    }
    self.apply_decrement(&mut t, items)?;
    t.stock_commits.insert(order_id);
    Ok(StockCommit::Committed)
  }

  async fn restock(&self, variant_id: Uuid, quantity: i32) -> Result<(), LedgerError> {
    ensure_positive(&[StockLine { variant_id, quantity }])?;
    let mut t = self.tables.lock();
    let current = t.stock.entry(variant_id).or_insert(0);
    *current = current
      .checked_add(quantity)
      .ok_or(LedgerError::QuantityOverflow { variant_id })?;
    Ok(())
  }
}

#[async_trait]
impl CouponLedger for MemoryStore {
  async fn find_by_code(&self, code: &str) -> Result<Option<PromoCode>, StoreError> {
    Ok(
      self
        .tables
        .lock()
        .coupons
        .values()
        .find(|c| c.code.eq_ignore_ascii_case(code))
        .cloned(),
    )
  }

  async fn find_by_id(&self, promo_code_id: Uuid) -> Result<Option<PromoCode>, StoreError> {
    Ok(self.tables.lock().coupons.get(&promo_code_id).cloned())
  }

  async fn customer_redemptions(&self, promo_code_id: Uuid, customer_id: Uuid) -> Result<i64, StoreError> {
    Ok(
      self
        .tables
        .lock()
        .usages
        .iter()
        .filter(|u| u.promo_code_id == promo_code_id && u.customer_id == customer_id)
        .count() as i64,
    )
  }

  async fn record_usage(
    &self,
    promo_code_id: Uuid,
    customer_id: Uuid,
    order_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<UsageRecord, StoreError> {
    self.trip(FaultPoint::RecordCouponUsage)?;
    let mut t = self.tables.lock();
    if t
      .usages
      .iter()
      .any(|u| u.promo_code_id == promo_code_id && u.order_id == order_id)
    {
      return Ok(UsageRecord::AlreadyRecorded);
    }
    let coupon = t
      .coupons
      .get_mut(&promo_code_id)
      .ok_or_else(|| StoreError::NotFound(format!("promo code {}", promo_code_id)))?;
    coupon.current_uses += 1;
    t.usages.push(PromoCodeUsage {
      id: Uuid::new_v4(),
      promo_code_id,
      customer_id,
      order_id,
      used_at: now,
    });
    Ok(UsageRecord::Recorded)
  }
}
