// storefront/src/services/stock_ledger.rs

//! Per-variant stock, the only path through which `stock_quantity` changes.

use crate::db::StoreError;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockLine {
  pub variant_id: Uuid,
  pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockShortage {
  pub variant_id: Uuid,
  pub available: i32,
  pub requested: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Availability {
  pub shortages: Vec<StockShortage>,
}

impl Availability {
  pub fn is_available(&self) -> bool {
    self.shortages.is_empty()
  }
}

/// Result of committing an order's stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockCommit {
  Committed,
  /// Stock for this order was already taken; nothing changed.
  AlreadyCommitted,
}

#[derive(Debug, Error)]
pub enum LedgerError {
  #[error("Insufficient stock for {} variant(s)", .0.len())]
  InsufficientStock(Vec<StockShortage>),

  #[error("Invalid quantity {quantity} for variant {variant_id}")]
  InvalidQuantity { variant_id: Uuid, quantity: i32 },

  #[error("Combined quantity for variant {variant_id} is too large")]
  QuantityOverflow { variant_id: Uuid },

  #[error(transparent)]
  Store(#[from] StoreError),
}

/// Sums lines that share a variant, keeping first-seen order. Every line must
/// be positive and every sum must fit the stock column.
pub fn merge_lines(items: &[StockLine]) -> Result<Vec<StockLine>, LedgerError> {
  ensure_positive(items)?;
  let mut merged: Vec<StockLine> = Vec::with_capacity(items.len());
  let mut index: HashMap<Uuid, usize> = HashMap::new();
  for line in items {
    match index.get(&line.variant_id) {
      Some(&i) => {
        merged[i].quantity = merged[i]
          .quantity
          .checked_add(line.quantity)
          .ok_or(LedgerError::QuantityOverflow {
            variant_id: line.variant_id,
          })?;
      }
      None => {
        index.insert(line.variant_id, merged.len());
        merged.push(*line);
      }
    }
  }
  Ok(merged)
}

/// Shortages of `requested` against `available`. Unknown variants count as zero.
pub fn shortages(requested: &[StockLine], available: &HashMap<Uuid, i32>) -> Vec<StockShortage> {
  requested
    .iter()
    .filter_map(|line| {
      let have = available.get(&line.variant_id).copied().unwrap_or(0);
      (have < line.quantity).then_some(StockShortage {
        variant_id: line.variant_id,
        available: have,
        requested: line.quantity,
      })
    })
    .collect()
}

pub(crate) fn ensure_positive(items: &[StockLine]) -> Result<(), LedgerError> {
  match items.iter().find(|l| l.quantity <= 0) {
    Some(bad) => Err(LedgerError::InvalidQuantity {
      variant_id: bad.variant_id,
      quantity: bad.quantity,
    }),
    None => Ok(()),
  }
}

#[async_trait]
pub trait StockLedger: Send + Sync {
  /// Current quantities for the given variants. Unknown ids are absent.
  async fn quantities(&self, variant_ids: &[Uuid]) -> Result<HashMap<Uuid, i32>, StoreError>;

  /// All-or-nothing decrement. Re-validates every line under the backend's
  /// atomic primitive; on any shortage nothing changes.
  async fn decrement(&self, items: &[StockLine]) -> Result<(), LedgerError>;

  /// `decrement`, keyed by order: at most one commit per order ever applies.
  async fn commit_for_order(&self, order_id: Uuid, items: &[StockLine]) -> Result<StockCommit, LedgerError>;

  /// Adds stock. Only positive quantities are accepted; removing stock goes
  /// through `decrement`.
  async fn restock(&self, variant_id: Uuid, quantity: i32) -> Result<(), LedgerError>;

  /// Read-only check. Advisory: the decrement re-validates.
  async fn check_availability(&self, items: &[StockLine]) -> Result<Availability, LedgerError> {
    let merged = merge_lines(items)?;
    let ids: Vec<Uuid> = merged.iter().map(|l| l.variant_id).collect();
    let available = self.quantities(&ids).await?;
    Ok(Availability {
      shortages: shortages(&merged, &available),
    })
  }
}
