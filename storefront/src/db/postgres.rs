// storefront/src/db/postgres.rs

//! Postgres backend. Atomic primitives are single conditional statements or
//! short transactions; see `migrations/` for the schema and its constraints.

use super::{CartStore, CompletionOutcome, OrderStore, PaymentStore, StatusJournal, StoreError};
use crate::models::{
  CartItem, Effect, EffectState, Order, OrderItem, OrderStatus, PaymentTransaction, PromoCode, StatusHistoryEntry,
  TransactionStatus,
};
use crate::services::coupon_ledger::{CouponLedger, UsageRecord};
use crate::services::stock_ledger::{
  ensure_positive, merge_lines, shortages, LedgerError, StockCommit, StockLedger, StockLine,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgStore {
  pool: PgPool,
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
  matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl PgStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
    let pool = PgPoolOptions::new().max_connections(10).connect(database_url).await?;
    info!("Successfully connected to the database.");
    Ok(Self { pool })
  }

  pub async fn run_migrations(&self) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations")
      .run(&self.pool)
      .await
      .map_err(|e| StoreError::Database(e.into()))?;
    info!("Database migrations applied.");
    Ok(())
  }

  pub fn pool(&self) -> &PgPool {
    &self.pool
  }

  async fn cart_version(&self, customer_id: Uuid, variant_id: Uuid) -> Result<Option<i64>, StoreError> {
    let version: Option<i64> =
      sqlx::query_scalar("SELECT version FROM cart_items WHERE customer_id = $1 AND variant_id = $2")
        .bind(customer_id)
        .bind(variant_id)
        .fetch_optional(&self.pool)
        .await?;
    Ok(version)
  }
}

#[async_trait]
impl OrderStore for PgStore {
  async fn order_number_exists(&self, order_number: &str) -> Result<bool, StoreError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE order_number = $1)")
      .bind(order_number)
      .fetch_one(&self.pool)
      .await?;
    Ok(exists)
  }

  #[instrument(name = "pg::insert_order", skip_all, fields(order_id = %order.id))]
  async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
    let fx = &order.effects;
    let res = sqlx::query(
      "INSERT INTO orders (id, order_number, customer_id, subtotal_minor, discount_minor, total_minor, currency,
         status, payment_status, promo_code_id, shipping_address, mark_order_paid, commit_stock,
         record_coupon_usage, clear_cart, append_history, created_at, updated_at, paid_at)
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)",
    )
    .bind(order.id)
    .bind(&order.order_number)
    .bind(order.customer_id)
    .bind(order.subtotal_minor)
    .bind(order.discount_minor)
    .bind(order.total_minor)
    .bind(order.currency)
    .bind(order.status)
    .bind(order.payment_status)
    .bind(order.promo_code_id)
    .bind(&order.shipping_address)
    .bind(fx.mark_order_paid)
    .bind(fx.commit_stock)
    .bind(fx.record_coupon_usage)
    .bind(fx.clear_cart)
    .bind(fx.append_history)
    .bind(order.created_at)
    .bind(order.updated_at)
    .bind(order.paid_at)
    .execute(&self.pool)
    .await;
    match res {
      Ok(_) => Ok(()),
      Err(e) if is_unique_violation(&e) => Err(StoreError::Duplicate(format!("order_number {}", order.order_number))),
      Err(e) => Err(e.into()),
    }
  }

  async fn insert_order_items(&self, items: &[OrderItem]) -> Result<(), StoreError> {
    let mut tx = self.pool.begin().await?;
    for item in items {
      sqlx::query(
        "INSERT INTO order_items (id, order_id, product_id, variant_id, color_id, size_id, product_name,
           unit_price_minor, discount_percentage, total_price_minor, quantity)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
      )
      .bind(item.id)
      .bind(item.order_id)
      .bind(item.product_id)
      .bind(item.variant_id)
      .bind(item.color_id)
      .bind(item.size_id)
      .bind(&item.product_name)
      .bind(item.unit_price_minor)
      .bind(item.discount_percentage)
      .bind(item.total_price_minor)
      .bind(item.quantity)
      .execute(&mut *tx)
      .await?;
    }
    tx.commit().await?;
    Ok(())
  }

  async fn delete_order(&self, order_id: Uuid) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM orders WHERE id = $1")
      .bind(order_id)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
      .bind(order_id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(order)
  }

  async fn list_order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, StoreError> {
    let items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id")
      .bind(order_id)
      .fetch_all(&self.pool)
      .await?;
    Ok(items)
  }

  async fn mark_order_paid(&self, order_id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
    let res = sqlx::query(
      "UPDATE orders SET payment_status = 'PAID', paid_at = $2, updated_at = $2
       WHERE id = $1 AND payment_status = 'PENDING'",
    )
    .bind(order_id)
    .bind(now)
    .execute(&self.pool)
    .await?;
    Ok(res.rows_affected() == 1)
  }

  async fn set_effect_state(&self, order_id: Uuid, effect: Effect, state: EffectState) -> Result<(), StoreError> {
    // Column names come from a closed enum, never from input.
    let sql = format!("UPDATE orders SET {} = $2 WHERE id = $1", effect.as_str());
    let res = sqlx::query(&sql).bind(order_id).bind(state).execute(&self.pool).await?;
    if res.rows_affected() == 0 {
      return Err(StoreError::NotFound(format!("order {}", order_id)));
    }
    Ok(())
  }

  async fn update_status(
    &self,
    order_id: Uuid,
    from: OrderStatus,
    to: OrderStatus,
    now: DateTime<Utc>,
  ) -> Result<bool, StoreError> {
    let res = sqlx::query("UPDATE orders SET status = $3, updated_at = $4 WHERE id = $1 AND status = $2")
      .bind(order_id)
      .bind(from)
      .bind(to)
      .bind(now)
      .execute(&self.pool)
      .await?;
    Ok(res.rows_affected() == 1)
  }
}

#[async_trait]
impl PaymentStore for PgStore {
  async fn insert_transaction(&self, txn: &PaymentTransaction) -> Result<(), StoreError> {
    sqlx::query(
      "INSERT INTO payment_transactions (id, order_id, gateway, transaction_type, amount_minor, currency, status,
         qr_payload, settlement_hash, expires_at, completed_at, gateway_request, gateway_response, created_at, updated_at)
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
    )
    .bind(txn.id)
    .bind(txn.order_id)
    .bind(&txn.gateway)
    .bind(&txn.transaction_type)
    .bind(txn.amount_minor)
    .bind(txn.currency)
    .bind(txn.status)
    .bind(&txn.qr_payload)
    .bind(&txn.settlement_hash)
    .bind(txn.expires_at)
    .bind(txn.completed_at)
    .bind(&txn.gateway_request)
    .bind(&txn.gateway_response)
    .bind(txn.created_at)
    .bind(txn.updated_at)
    .execute(&self.pool)
    .await
    .map_err(|e| {
      if is_unique_violation(&e) {
        StoreError::Duplicate(format!("settlement_hash {}", txn.settlement_hash))
      } else {
        e.into()
      }
    })?;
    Ok(())
  }

  async fn get_transaction(&self, transaction_id: Uuid) -> Result<Option<PaymentTransaction>, StoreError> {
    let txn = sqlx::query_as::<_, PaymentTransaction>("SELECT * FROM payment_transactions WHERE id = $1")
      .bind(transaction_id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(txn)
  }

  async fn find_by_settlement_hash(&self, settlement_hash: &str) -> Result<Option<PaymentTransaction>, StoreError> {
    let txn = sqlx::query_as::<_, PaymentTransaction>("SELECT * FROM payment_transactions WHERE settlement_hash = $1")
      .bind(settlement_hash)
      .fetch_optional(&self.pool)
      .await?;
    Ok(txn)
  }

  async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<PaymentTransaction>, StoreError> {
    let txns = sqlx::query_as::<_, PaymentTransaction>(
      "SELECT * FROM payment_transactions WHERE order_id = $1 ORDER BY created_at",
    )
    .bind(order_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(txns)
  }

  #[instrument(name = "pg::complete_transaction", skip(self, gateway_response))]
  async fn complete_transaction(
    &self,
    transaction_id: Uuid,
    now: DateTime<Utc>,
    gateway_response: serde_json::Value,
  ) -> Result<CompletionOutcome, StoreError> {
    let res = sqlx::query(
      "UPDATE payment_transactions t
       SET status = 'COMPLETED', completed_at = $2, updated_at = $2, gateway_response = $3
       WHERE t.id = $1 AND t.status = 'INITIATED' AND t.expires_at > $2
         AND NOT EXISTS (
           SELECT 1 FROM payment_transactions o WHERE o.order_id = t.order_id AND o.status = 'COMPLETED'
         )",
    )
    .bind(transaction_id)
    .bind(now)
    .bind(&gateway_response)
    .execute(&self.pool)
    .await;

    let rows = match res {
      Ok(done) => done.rows_affected(),
      // The partial unique index catches a sibling completing concurrently.
      Err(e) if is_unique_violation(&e) => return Ok(CompletionOutcome::OrderAlreadySettled),
      Err(e) => return Err(e.into()),
    };
    if rows == 1 {
      return Ok(CompletionOutcome::Completed);
    }

    let current = self
      .get_transaction(transaction_id)
      .await?
      .ok_or_else(|| StoreError::NotFound(format!("transaction {}", transaction_id)))?;
    Ok(if current.status != TransactionStatus::Initiated {
      CompletionOutcome::NotInitiated
    } else if current.expires_at <= now {
      CompletionOutcome::Expired
    } else {
      CompletionOutcome::OrderAlreadySettled
    })
  }

  async fn expire_transaction(&self, transaction_id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
    let res = sqlx::query(
      "UPDATE payment_transactions SET status = 'EXPIRED', updated_at = $2 WHERE id = $1 AND status = 'INITIATED'",
    )
    .bind(transaction_id)
    .bind(now)
    .execute(&self.pool)
    .await?;
    Ok(res.rows_affected() == 1)
  }

  async fn fail_transaction(
    &self,
    transaction_id: Uuid,
    now: DateTime<Utc>,
    gateway_response: serde_json::Value,
  ) -> Result<bool, StoreError> {
    let res = sqlx::query(
      "UPDATE payment_transactions SET status = 'FAILED', updated_at = $2, gateway_response = $3
       WHERE id = $1 AND status = 'INITIATED'",
    )
    .bind(transaction_id)
    .bind(now)
    .bind(&gateway_response)
    .execute(&self.pool)
    .await?;
    Ok(res.rows_affected() == 1)
  }

  async fn completed_awaiting_effects(&self) -> Result<Vec<PaymentTransaction>, StoreError> {
    let txns = sqlx::query_as::<_, PaymentTransaction>(
      "SELECT t.* FROM payment_transactions t JOIN orders o ON o.id = t.order_id
       WHERE t.status = 'COMPLETED'
         AND 'PENDING'::effect_state IN (o.mark_order_paid, o.commit_stock, o.record_coupon_usage,
                                         o.clear_cart, o.append_history)",
    )
    .fetch_all(&self.pool)
    .await?;
    Ok(txns)
  }
}

#[async_trait]
impl CartStore for PgStore {
  async fn list_cart(&self, customer_id: Uuid) -> Result<Vec<CartItem>, StoreError> {
    let items = sqlx::query_as::<_, CartItem>("SELECT * FROM cart_items WHERE customer_id = $1 ORDER BY updated_at")
      .bind(customer_id)
      .fetch_all(&self.pool)
      .await?;
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
    let written: Option<CartItem> = match (expected_version, quantity) {
      (None, 0) => {
        let current_version = self.cart_version(customer_id, variant_id).await?;
        if current_version.is_some() {
          return Err(StoreError::VersionConflict { current_version });
        }
        return Ok(None);
      }
      (None, _) => {
        sqlx::query_as::<_, CartItem>(
          "INSERT INTO cart_items (id, customer_id, variant_id, quantity, version, updated_at)
           VALUES ($1, $2, $3, $4, 1, $5)
           ON CONFLICT (customer_id, variant_id) DO NOTHING
           RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(customer_id)
        .bind(variant_id)
        .bind(quantity)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
      }
      (Some(version), 0) => {
        let res = sqlx::query("DELETE FROM cart_items WHERE customer_id = $1 AND variant_id = $2 AND version = $3")
          .bind(customer_id)
          .bind(variant_id)
          .bind(version)
          .execute(&self.pool)
          .await?;
        if res.rows_affected() == 1 {
          return Ok(None);
        }
        None
      }
      (Some(version), _) => {
        sqlx::query_as::<_, CartItem>(
          "UPDATE cart_items SET quantity = $4, version = version + 1, updated_at = $5
           WHERE customer_id = $1 AND variant_id = $2 AND version = $3
           RETURNING *",
        )
        .bind(customer_id)
        .bind(variant_id)
        .bind(version)
        .bind(quantity)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
      }
    };

    match written {
      Some(item) => Ok(Some(item)),
      None => Err(StoreError::VersionConflict {
        current_version: self.cart_version(customer_id, variant_id).await?,
      }),
    }
  }

  async fn clear_cart(&self, customer_id: Uuid) -> Result<u64, StoreError> {
    let res = sqlx::query("DELETE FROM cart_items WHERE customer_id = $1")
      .bind(customer_id)
      .execute(&self.pool)
      .await?;
    Ok(res.rows_affected())
  }
}

#[async_trait]
impl StatusJournal for PgStore {
  async fn append(&self, entry: &StatusHistoryEntry) -> Result<(), StoreError> {
    sqlx::query(
      "INSERT INTO order_status_history (id, order_id, status, note, actor, created_at)
       VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(entry.id)
    .bind(entry.order_id)
    .bind(entry.status)
    .bind(&entry.note)
    .bind(&entry.actor)
    .bind(entry.created_at)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn history(&self, order_id: Uuid) -> Result<Vec<StatusHistoryEntry>, StoreError> {
    let entries = sqlx::query_as::<_, StatusHistoryEntry>(
      "SELECT * FROM order_status_history WHERE order_id = $1 ORDER BY created_at, id",
    )
    .bind(order_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(entries)
  }
}

/// Locks the affected variant rows, re-validates, then decrements. Leaves the
/// transaction open on success; the caller commits. On a shortage the caller's
/// transaction is dropped, which rolls it back.
async fn decrement_locked(tx: &mut Transaction<'_, Postgres>, items: &[StockLine]) -> Result<(), LedgerError> {
  let mut merged = merge_lines(items)?;
  // Fixed lock order across concurrent batches.
  merged.sort_by_key(|l| l.variant_id);
  let ids: Vec<Uuid> = merged.iter().map(|l| l.variant_id).collect();

  let rows: Vec<(Uuid, i32)> =
    sqlx::query_as("SELECT id, stock_quantity FROM product_variants WHERE id = ANY($1) ORDER BY id FOR UPDATE")
      .bind(&ids)
      .fetch_all(&mut **tx)
      .await
      .map_err(StoreError::from)?;
  let available: HashMap<Uuid, i32> = rows.into_iter().collect();
  let short = shortages(&merged, &available);
  if !short.is_empty() {
    return Err(LedgerError::InsufficientStock(short));
  }

  for line in &merged {
    sqlx::query("UPDATE product_variants SET stock_quantity = stock_quantity - $2 WHERE id = $1")
      .bind(line.variant_id)
      .bind(line.quantity)
      .execute(&mut **tx)
      .await
      .map_err(StoreError::from)?;
  }
  Ok(())
}

#[async_trait]
impl StockLedger for PgStore {
  async fn quantities(&self, variant_ids: &[Uuid]) -> Result<HashMap<Uuid, i32>, StoreError> {
    let rows: Vec<(Uuid, i32)> =
      sqlx::query_as("SELECT id, stock_quantity FROM product_variants WHERE id = ANY($1)")
        .bind(variant_ids)
        .fetch_all(&self.pool)
        .await?;
    Ok(rows.into_iter().collect())
  }

  #[instrument(name = "pg::decrement_stock", skip_all, fields(lines = items.len()))]
  async fn decrement(&self, items: &[StockLine]) -> Result<(), LedgerError> {
    ensure_positive(items)?;
    let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
    decrement_locked(&mut tx, items).await?;
    tx.commit().await.map_err(StoreError::from)?;
    Ok(())
  }

  #[instrument(name = "pg::commit_stock", skip(self, items), fields(lines = items.len()))]
  async fn commit_for_order(&self, order_id: Uuid, items: &[StockLine]) -> Result<StockCommit, LedgerError> {
    ensure_positive(items)?;
    let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
    let claimed = sqlx::query(
      "INSERT INTO stock_commits (order_id, committed_at) VALUES ($1, NOW()) ON CONFLICT (order_id) DO NOTHING",
    )
    .bind(order_id)
    .execute(&mut *tx)
    .await
    .map_err(StoreError::from)?
    .rows_affected();
    if claimed == 0 {
      tx.rollback().await.map_err(StoreError::from)?;
      return Ok(StockCommit::AlreadyCommitted);
    }
    decrement_locked(&mut tx, items).await?;
    tx.commit().await.map_err(StoreError::from)?;
    Ok(StockCommit::Committed)
  }

  async fn restock(&self, variant_id: Uuid, quantity: i32) -> Result<(), LedgerError> {
    ensure_positive(&[StockLine { variant_id, quantity }])?;
    sqlx::query(
      "INSERT INTO product_variants (id, stock_quantity) VALUES ($1, $2)
       ON CONFLICT (id) DO UPDATE SET stock_quantity = product_variants.stock_quantity + EXCLUDED.stock_quantity",
    )
    .bind(variant_id)
    .bind(quantity)
    .execute(&self.pool)
    .await
    .map_err(StoreError::from)?;
    Ok(())
  }
}

#[async_trait]
impl CouponLedger for PgStore {
  async fn find_by_code(&self, code: &str) -> Result<Option<PromoCode>, StoreError> {
    let coupon = sqlx::query_as::<_, PromoCode>(
      "SELECT * FROM promo_codes WHERE UPPER(code) = UPPER($1) ORDER BY deleted_at NULLS FIRST LIMIT 1",
    )
    .bind(code)
    .fetch_optional(&self.pool)
    .await?;
    Ok(coupon)
  }

  async fn find_by_id(&self, promo_code_id: Uuid) -> Result<Option<PromoCode>, StoreError> {
    let coupon = sqlx::query_as::<_, PromoCode>("SELECT * FROM promo_codes WHERE id = $1")
      .bind(promo_code_id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(coupon)
  }

  async fn customer_redemptions(&self, promo_code_id: Uuid, customer_id: Uuid) -> Result<i64, StoreError> {
    let count: i64 =
      sqlx::query_scalar("SELECT COUNT(*) FROM promo_code_usages WHERE promo_code_id = $1 AND customer_id = $2")
        .bind(promo_code_id)
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await?;
    Ok(count)
  }

  async fn record_usage(
    &self,
    promo_code_id: Uuid,
    customer_id: Uuid,
    order_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<UsageRecord, StoreError> {
    let mut tx = self.pool.begin().await?;
    let inserted = sqlx::query(
      "INSERT INTO promo_code_usages (id, promo_code_id, customer_id, order_id, used_at)
       VALUES ($1, $2, $3, $4, $5)
       ON CONFLICT (promo_code_id, order_id) DO NOTHING",
    )
    .bind(Uuid::new_v4())
    .bind(promo_code_id)
    .bind(customer_id)
    .bind(order_id)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    if inserted == 0 {
      tx.rollback().await?;
      return Ok(UsageRecord::AlreadyRecorded);
    }
    sqlx::query("UPDATE promo_codes SET current_uses = current_uses + 1 WHERE id = $1")
      .bind(promo_code_id)
      .execute(&mut *tx)
      .await?;
    tx.commit().await?;
    Ok(UsageRecord::Recorded)
  }
}
