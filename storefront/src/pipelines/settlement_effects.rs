// storefront/src/pipelines/settlement_effects.rs

//! Post-payment effects. Each one is idempotent, tracked on the order, and
//! safe to run again from the retry worker.

use crate::errors::{AppError, Result as AppResult};
use crate::models::{Effect, EffectState, Order, OrderStatus};
use crate::pipelines::common_steps::{journal_append, journal_note};
use crate::services::settlement_worker::RetryJob;
use crate::services::stock_ledger::{LedgerError, StockCommit, StockLine};
use crate::state::AppState;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

async fn perform(app_state: &AppState, order: &Order, effect: Effect) -> AppResult<EffectState> {
  let now = app_state.clock.now();
  match effect {
    Effect::MarkOrderPaid => {
      if !app_state.orders.mark_order_paid(order.id, now).await? {
        info!(order_id = %order.id, "Order already marked paid.");
      }
      Ok(EffectState::Applied)
    }
    Effect::CommitStock => {
      let lines: Vec<StockLine> = app_state
        .orders
        .list_order_items(order.id)
        .await?
        .iter()
        .map(|i| StockLine {
          variant_id: i.variant_id,
          quantity: i.quantity,
        })
        .collect();
      match app_state.stock.commit_for_order(order.id, &lines).await {
        Ok(StockCommit::Committed) => Ok(EffectState::Applied),
        Ok(StockCommit::AlreadyCommitted) => {
          info!(order_id = %order.id, "Stock already committed for order.");
          Ok(EffectState::Applied)
        }
        Err(LedgerError::InsufficientStock(shortages)) => {
          error!(
            alert = true,
            order_id = %order.id,
            effect = effect.as_str(),
            ?shortages,
            "Oversell after payment; manual reconciliation required."
          );
          journal_note(
            app_state,
            order.id,
            order.status,
            "Stock could not be committed after payment (oversell); manual reconciliation required",
            Some("system"),
          )
          .await;
          Ok(EffectState::Escalated)
        }
        Err(e) => Err(e.into()),
      }
    }
    Effect::RecordCouponUsage => match order.promo_code_id {
      Some(promo_code_id) => {
        app_state
          .coupons
          .record_usage(promo_code_id, order.customer_id, order.id, now)
          .await?;
        Ok(EffectState::Applied)
      }
      None => Ok(EffectState::NotApplicable),
    },
    Effect::ClearCart => {
      app_state.carts.clear_cart(order.customer_id).await?;
      Ok(EffectState::Applied)
    }
    Effect::AppendHistory => {
      journal_append(app_state, order.id, order.status, "Payment received", Some("system")).await?;
      Ok(EffectState::Applied)
    }
  }
}

/// Applies `effect` to the order unless it is already settled, and records
/// the result. Errors are transient and leave the marker in PENDING.
#[instrument(name = "settlement::settle_effect", skip(app_state), fields(effect = effect.as_str()), err(Display))]
pub async fn settle_effect(app_state: &AppState, order_id: Uuid, effect: Effect) -> AppResult<EffectState> {
  let order = app_state
    .orders
    .get_order(order_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("order {}", order_id)))?;
  let current = order.effects.get(effect);
  if current.is_settled() {
    return Ok(current);
  }
  let outcome = perform(app_state, &order, effect).await?;
  app_state.orders.set_effect_state(order_id, effect, outcome).await?;
  Ok(outcome)
}

/// Used by the reconciler's effect steps: a failure is logged, queued for
/// retry and returned so the best-effort step records it.
pub async fn run_effect(app_state: &AppState, order_id: Uuid, transaction_id: Uuid, effect: Effect) -> AppResult<()> {
  match settle_effect(app_state, order_id, effect).await {
    Ok(_) => Ok(()),
    Err(e) => {
      error!(
        %order_id,
        %transaction_id,
        effect = effect.as_str(),
        error = %e,
        "Post-payment effect failed; queued for retry."
      );
      app_state.retries.enqueue(RetryJob::first(order_id, transaction_id, effect));
      Err(e)
    }
  }
}

/// Queues every unsettled effect of every COMPLETED transaction. Run at
/// startup so a crash between claim and effects converges.
#[instrument(name = "settlement::recover_pending", skip_all)]
pub async fn recover_pending_settlements(app_state: &AppState) -> AppResult<usize> {
  let mut queued = 0;
  for txn in app_state.payments.completed_awaiting_effects().await? {
    let Some(order) = app_state.orders.get_order(txn.order_id).await? else {
      warn!(order_id = %txn.order_id, transaction_id = %txn.id, "Completed transaction without an order.");
      continue;
    };
    for effect in order.effects.pending() {
      app_state.retries.enqueue(RetryJob::first(order.id, txn.id, effect));
      queued += 1;
    }
  }
  if queued > 0 {
    warn!(queued, "Recovered unsettled post-payment effects.");
  }
  Ok(queued)
}

/// Raised when a second payment lands for an order that is already paid.
pub async fn flag_duplicate_settlement(app_state: &AppState, order_id: Uuid, transaction_id: Uuid) {
  error!(
    alert = true,
    %order_id,
    %transaction_id,
    "Duplicate settlement for an already-paid order; refund required."
  );
  let status = match app_state.orders.get_order(order_id).await {
    Ok(Some(order)) => order.status,
    _ => OrderStatus::Pending,
  };
  journal_note(
    app_state,
    order_id,
    status,
    "Duplicate payment received; refund required",
    Some("system"),
  )
  .await;
}
