// seamline/src/saga/definition.rs

//! Contains the `Saga<TData, Err>` struct and its structural methods.

use crate::core::context::{Compensation, Handler};
use crate::core::step::{SkipCondition, StepDef};
use crate::error::SagaError;
use std::collections::HashMap;

/// An ordered list of named steps over a root data type `TData`, whose
/// handlers fail with `Err`.
///
/// `Err` must be `From<SagaError>` so that engine-level faults (a required step
/// without handlers, for instance) surface through the same error type.
pub struct Saga<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<SagaError> + Send + Sync + 'static,
{
  pub(crate) name: String,
  pub(crate) steps: Vec<StepDef<TData>>,
  pub(crate) on: HashMap<String, Vec<Handler<TData, Err>>>,
  pub(crate) compensations: HashMap<String, Vec<Compensation<TData, Err>>>,
}

impl<TData, Err> Saga<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<SagaError> + Send + Sync + 'static,
{
  /// Creates a saga from `(step_name, optional, skip_if)` tuples, run in order.
  pub fn new(name: &str, step_defs: &[(&str, bool, Option<SkipCondition<TData>>)]) -> Self {
    let steps = step_defs
      .iter()
      .map(|(step_name, optional, skip_cond_opt)| StepDef {
        name: (*step_name).to_string(),
        optional: *optional,
        skip_if: skip_cond_opt.clone(),
      })
      .collect();

    Self {
      name: name.to_string(),
      steps,
      on: HashMap::new(),
      compensations: HashMap::new(),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn step_names(&self) -> Vec<&str> {
    self.steps.iter().map(|s| s.name.as_str()).collect()
  }

  /// Panics on an unknown step name: a typo in saga wiring is a programming error.
  pub(crate) fn ensure_step_exists(&self, step_name: &str) {
    if !self.steps.iter().any(|s| s.name == step_name) {
      panic!(
        "Seamline setup error: step '{}' not found in saga '{}'.",
        step_name, self.name
      );
    }
  }

  pub fn set_optional(&mut self, step_name: &str, optional: bool) -> Result<(), SagaError> {
    let step = self
      .steps
      .iter_mut()
      .find(|s| s.name == step_name)
      .ok_or_else(|| SagaError::StepNotFound {
        step_name: step_name.to_string(),
      })?;
    step.optional = optional;
    Ok(())
  }

  pub fn set_skip_condition(
    &mut self,
    step_name: &str,
    skip_if: Option<SkipCondition<TData>>,
  ) -> Result<(), SagaError> {
    let step = self
      .steps
      .iter_mut()
      .find(|s| s.name == step_name)
      .ok_or_else(|| SagaError::StepNotFound {
        step_name: step_name.to_string(),
      })?;
    step.skip_if = skip_if;
    Ok(())
  }
}
