// seamline/src/core/control.rs

//! Signals for controlling saga flow and the outcome of a saga run.

/// Returned by a step handler to say whether the saga should go on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepControl {
  /// Run the remaining handlers of this step, then the next step.
  Continue,
  /// End the saga here, successfully. Nothing after this handler runs and
  /// no compensation is triggered: the work done so far stands.
  Halt,
}

/// Outcome of a saga run that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SagaOutcome {
  /// Every step that was not skipped ran to completion.
  Completed,
  /// A handler returned `StepControl::Halt` during `step`.
  Halted { step: String },
}

impl SagaOutcome {
  pub fn is_completed(&self) -> bool {
    matches!(self, SagaOutcome::Completed)
  }

  pub fn halted_at(&self) -> Option<&str> {
    match self {
      SagaOutcome::Halted { step } => Some(step.as_str()),
      SagaOutcome::Completed => None,
    }
  }
}
