// seamline/src/error.rs
use anyhow::Error as AnyhowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SagaError {
  #[error("Step not found: {step_name}")]
  StepNotFound { step_name: String },

  #[error("Handler missing for required step: {step_name}")]
  HandlerMissing { step_name: String },

  #[error("Type mismatch during context downcast (expected {expected_type}, at '{site}')")]
  TypeMismatch { site: String, expected_type: String },

  #[error("No saga registered for context type {context_type}")]
  SagaNotRegistered { context_type: String },

  #[error("Error in user-provided handler or external operation. Source: {source}")]
  HandlerError {
    #[source]
    source: AnyhowError,
  },

  #[error("Internal saga engine error: {0}")]
  Internal(String),
}

impl From<AnyhowError> for SagaError {
  fn from(err: AnyhowError) -> Self {
    SagaError::HandlerError { source: err }
  }
}

/// A required step failed. Carries the step name, the handler's error, and the
/// names of the completed steps whose compensations ran (most recent first).
#[derive(Debug, Error)]
#[error("Saga step '{step}' failed: {source}")]
pub struct StepFailure<Err>
where
  Err: std::error::Error + Send + Sync + 'static,
{
  pub step: String,
  #[source]
  pub source: Err,
  pub compensated: Vec<String>,
  /// Compensations that themselves failed, as `(step, message)`.
  pub compensation_errors: Vec<(String, String)>,
}

impl<Err> StepFailure<Err>
where
  Err: std::error::Error + Send + Sync + 'static,
{
  pub fn into_source(self) -> Err {
    self.source
  }

  pub fn fully_compensated(&self) -> bool {
    self.compensation_errors.is_empty()
  }
}

pub type SagaResult<T, E = SagaError> = std::result::Result<T, E>;
