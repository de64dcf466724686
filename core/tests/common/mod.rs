// tests/common/mod.rs
#![allow(dead_code)]

use once_cell::sync::Lazy;
use seamline::{ContextData, SagaError, StepControl, StepFailure};
use std::sync::{Arc, Mutex};
use tracing::Level;

#[derive(Clone, Debug, Default)]
pub struct TestContext {
  pub counter: i32,
  pub steps_executed: Vec<String>,
  pub compensations_run: Vec<String>,
  pub halt_at: Option<String>,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TestError {
  #[error("Saga engine error: {0}")]
  Saga(String),

  #[error("Test handler failed: {0}")]
  Handler(String),

  #[error("Step '{step}' failed: {message}")]
  Step { step: String, message: String },
}

impl From<SagaError> for TestError {
  fn from(err: SagaError) -> Self {
    TestError::Saga(format!("{:?}", err))
  }
}

impl From<StepFailure<TestError>> for TestError {
  fn from(failure: StepFailure<TestError>) -> Self {
    TestError::Step {
      step: failure.step.clone(),
      message: failure.source.to_string(),
    }
  }
}

pub async fn record_step(ctx: ContextData<TestContext>, step_name: &'static str) -> Result<StepControl, TestError> {
  let mut guard = ctx.write();
  guard.counter += 1;
  guard.steps_executed.push(step_name.to_string());
  if guard.halt_at.as_deref() == Some(step_name) {
    return Ok(StepControl::Halt);
  }
  Ok(StepControl::Continue)
}

pub async fn fail_step(ctx: ContextData<TestContext>, step_name: &'static str) -> Result<StepControl, TestError> {
  ctx.write().steps_executed.push(step_name.to_string());
  Err(TestError::Handler(format!("{} exploded", step_name)))
}

pub async fn undo_step(ctx: ContextData<TestContext>, step_name: &'static str) -> Result<(), TestError> {
  let mut guard = ctx.write();
  guard.counter -= 1;
  guard.compensations_run.push(step_name.to_string());
  Ok(())
}

/// Shared log for asserting ordering across handlers that do not own the context.
pub fn shared_log() -> Arc<Mutex<Vec<String>>> {
  Arc::new(Mutex::new(Vec::new()))
}

static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}
