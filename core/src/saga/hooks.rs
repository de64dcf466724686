// seamline/src/saga/hooks.rs

//! Registration of step handlers and compensating actions.

use crate::core::context::{Compensation, Handler};
use crate::core::context_data::ContextData;
use crate::core::control::StepControl;
use crate::error::SagaError;
use crate::saga::definition::Saga;
use std::future::Future;
use tracing::{event, Level};

impl<TData, Err> Saga<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<SagaError> + Send + Sync + 'static,
{
  /// Registers a handler for `step_name`. Several handlers on one step run in
  /// registration order.
  ///
  /// The handler's own error type only has to convert into the saga's `Err`.
  pub fn on_step<F, UserErr>(
    &mut self,
    step_name: &str,
    handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static,
  ) where
    F: Future<Output = Result<StepControl, UserErr>> + Send + 'static,
    UserErr: Into<Err> + Send + Sync + 'static,
  {
    self.ensure_step_exists(step_name);
    let final_handler: Handler<TData, Err> = Box::new(move |ctx_data| {
      let user_fut = handler_fn(ctx_data);
      Box::pin(async move { user_fut.await.map_err(Into::into) })
    });
    self.on.entry(step_name.to_string()).or_default().push(final_handler);
  }

  /// Registers a compensating action undoing `step_name`. It runs only if the
  /// step completed and a later required step failed.
  pub fn compensate_with<F, UserErr>(
    &mut self,
    step_name: &str,
    compensation_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static,
  ) where
    F: Future<Output = Result<(), UserErr>> + Send + 'static,
    UserErr: Into<Err> + Send + Sync + 'static,
  {
    self.ensure_step_exists(step_name);
    let final_compensation: Compensation<TData, Err> = Box::new(move |ctx_data| {
      let user_fut = compensation_fn(ctx_data);
      Box::pin(async move { user_fut.await.map_err(Into::into) })
    });
    self
      .compensations
      .entry(step_name.to_string())
      .or_default()
      .push(final_compensation);
    event!(Level::DEBUG, saga = %self.name, %step_name, "Compensation registered.");
  }

  pub fn has_compensation(&self, step_name: &str) -> bool {
    self.compensations.get(step_name).map_or(false, |c| !c.is_empty())
  }
}
