// storefront/src/services/settlement_worker.rs

//! Background retries for post-payment effects that failed transiently.

use crate::config::AppConfig;
use crate::models::Effect;
use crate::pipelines::settlement_effects::settle_effect;
use crate::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

const MAX_DELAY: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryJob {
  pub order_id: Uuid,
  pub transaction_id: Uuid,
  pub effect: Effect,
  /// 1-based retry number.
  pub attempt: u32,
}

impl RetryJob {
  pub fn first(order_id: Uuid, transaction_id: Uuid, effect: Effect) -> Self {
    Self {
      order_id,
      transaction_id,
      effect,
      attempt: 1,
    }
  }

  fn next(self) -> Self {
    Self {
      attempt: self.attempt + 1,
      ..self
    }
  }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub base_delay: Duration,
}

impl RetryPolicy {
  pub fn from_config(config: &AppConfig) -> Self {
    Self {
      max_attempts: config.settlement_retry_max_attempts,
      base_delay: Duration::from_millis(config.settlement_retry_base_delay_ms),
    }
  }

  /// `base * 2^(attempt - 1)`, capped at five minutes.
  pub fn delay_for(&self, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    self.base_delay.saturating_mul(factor).min(MAX_DELAY)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobResult {
  Settled,
  Requeued,
  Exhausted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
  pub settled: usize,
  pub requeued: usize,
  pub exhausted: usize,
}

#[derive(Clone)]
pub struct RetryQueue {
  tx: UnboundedSender<RetryJob>,
  rx: Arc<Mutex<UnboundedReceiver<RetryJob>>>,
  policy: RetryPolicy,
}

impl RetryQueue {
  pub fn new(policy: RetryPolicy) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      tx,
      rx: Arc::new(Mutex::new(rx)),
      policy,
    }
  }

  pub fn policy(&self) -> RetryPolicy {
    self.policy
  }

  pub fn enqueue(&self, job: RetryJob) {
    info!(
      order_id = %job.order_id,
      effect = job.effect.as_str(),
      attempt = job.attempt,
      "Queued post-payment effect for retry."
    );
    if self.tx.send(job).is_err() {
      error!(order_id = %job.order_id, effect = job.effect.as_str(), "Retry queue is closed; effect left pending.");
    }
  }
}

async fn process(app_state: &AppState, job: RetryJob) -> JobResult {
  let policy = app_state.retries.policy();
  match settle_effect(app_state, job.order_id, job.effect).await {
    Ok(state) => {
      info!(order_id = %job.order_id, effect = job.effect.as_str(), ?state, "Retried effect settled.");
      JobResult::Settled
    }
    Err(e) if job.attempt >= policy.max_attempts => {
      error!(
        alert = true,
        order_id = %job.order_id,
        transaction_id = %job.transaction_id,
        effect = job.effect.as_str(),
        attempts = job.attempt,
        error = %e,
        "Post-payment effect retries exhausted; manual reconciliation required."
      );
      JobResult::Exhausted
    }
    Err(e) => {
      warn!(order_id = %job.order_id, effect = job.effect.as_str(), attempt = job.attempt, error = %e, "Retry failed.");
      app_state.retries.enqueue(job.next());
      JobResult::Requeued
    }
  }
}

/// Runs queued retries forever, each after its backoff delay.
pub fn spawn_worker(app_state: AppState) -> JoinHandle<()> {
  tokio::spawn(async move {
    info!("Settlement retry worker started.");
    loop {
      let next = {
        let mut rx = app_state.retries.rx.lock().await;
        rx.recv().await
      };
      let Some(job) = next else {
        break;
      };
      let delay = app_state.retries.policy().delay_for(job.attempt);
      let state = app_state.clone();
      tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        process(&state, job).await;
      });
    }
    info!("Settlement retry worker stopped.");
  })
}

/// Processes everything queued right now, ignoring backoff. Jobs requeued by
/// this pass stay queued for the next one.
pub async fn drain(app_state: &AppState) -> DrainReport {
  let batch: Vec<RetryJob> = {
    let mut rx = app_state.retries.rx.lock().await;
    let mut jobs = Vec::new();
    while let Ok(job) = rx.try_recv() {
      jobs.push(job);
    }
    jobs
  };
  let mut report = DrainReport::default();
  for job in batch {
    match process(app_state, job).await {
      JobResult::Settled => report.settled += 1,
      JobResult::Requeued => report.requeued += 1,
      JobResult::Exhausted => report.exhausted += 1,
    }
  }
  report
}
