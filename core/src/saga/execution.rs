// seamline/src/saga/execution.rs

//! `Saga::run()`: executes steps in order and compensates on failure.

use crate::core::context_data::ContextData;
use crate::core::control::{SagaOutcome, StepControl};
use crate::core::step::StepDef;
use crate::error::{SagaError, StepFailure};
use crate::saga::definition::Saga;
use tracing::{event, instrument, span, Instrument, Level};

enum StepRun<Err> {
  Completed,
  Skipped,
  Halted,
  Failed(Err),
}

impl<TData, Err> Saga<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<SagaError> + Send + Sync + 'static,
{
  /// Runs the saga against `ctx_data`.
  ///
  /// When a required step fails, the compensations of every step that already
  /// completed run in reverse order before the failure is returned. A failing
  /// compensation is logged and recorded in the returned `StepFailure`; the
  /// remaining compensations still run.
  #[instrument(
        name = "Saga::run",
        skip_all,
        fields(
            saga = %self.name,
            context_data_type = %std::any::type_name::<TData>(),
            num_steps = self.steps.len(),
        ),
        err(Display)
    )]
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<SagaOutcome, StepFailure<Err>> {
    event!(Level::DEBUG, "Saga execution starting.");
    let mut completed: Vec<&str> = Vec::with_capacity(self.steps.len());

    for (step_idx, step_def) in self.steps.iter().enumerate() {
      let step_span = span!(
        Level::INFO,
        "saga_step",
        step_name = step_def.name.as_str(),
        step_index = step_idx,
        optional = step_def.optional
      );

      match self
        .run_step(step_def, ctx_data.clone())
        .instrument(step_span.clone())
        .await
      {
        StepRun::Completed => completed.push(step_def.name.as_str()),
        StepRun::Skipped => {}
        StepRun::Halted => {
          event!(Level::INFO, step_name = %step_def.name, "Saga halted by a handler.");
          return Ok(SagaOutcome::Halted {
            step: step_def.name.clone(),
          });
        }
        StepRun::Failed(err) => {
          let failure = self
            .compensate(&completed, ctx_data.clone(), step_def.name.clone(), err)
            .instrument(step_span)
            .await;
          return Err(failure);
        }
      }
    }

    event!(Level::DEBUG, "Saga execution completed.");
    Ok(SagaOutcome::Completed)
  }

  async fn run_step(&self, step_def: &StepDef<TData>, ctx_data: ContextData<TData>) -> StepRun<Err> {
    if let Some(skip_cond_fn) = &step_def.skip_if {
      if skip_cond_fn(ctx_data.clone()) {
        event!(Level::INFO, "Step skipped due to 'skip_if' condition.");
        return StepRun::Skipped;
      }
    }

    let handlers = match self.on.get(step_def.name.as_str()) {
      Some(handlers) if !handlers.is_empty() => handlers,
      _ if step_def.optional => {
        event!(Level::DEBUG, "Optional step has no handlers, skipping.");
        return StepRun::Skipped;
      }
      _ => {
        event!(Level::ERROR, "Required step has no handlers.");
        return StepRun::Failed(Err::from(SagaError::HandlerMissing {
          step_name: step_def.name.clone(),
        }));
      }
    };

    for (handler_idx, handler_fn) in handlers.iter().enumerate() {
      let handler_span = span!(Level::DEBUG, "on_handler", handler_index = handler_idx);
      match handler_fn(ctx_data.clone()).instrument(handler_span).await {
        Ok(StepControl::Continue) => {}
        Ok(StepControl::Halt) => return StepRun::Halted,
        Err(e) if step_def.optional => {
          event!(Level::WARN, error = %e, "Best-effort step failed; continuing saga.");
          return StepRun::Skipped;
        }
        Err(e) => {
          event!(Level::ERROR, error = %e, "Step handler failed.");
          return StepRun::Failed(e);
        }
      }
    }

    event!(Level::DEBUG, "Step finished.");
    StepRun::Completed
  }

  async fn compensate(
    &self,
    completed: &[&str],
    ctx_data: ContextData<TData>,
    failed_step: String,
    source: Err,
  ) -> StepFailure<Err> {
    let mut compensated = Vec::new();
    let mut compensation_errors = Vec::new();

    for step_name in completed.iter().rev() {
      let Some(actions) = self.compensations.get(*step_name) else {
        continue;
      };
      let mut step_ok = true;
      for action in actions {
        if let Err(e) = action(ctx_data.clone()).await {
          event!(Level::ERROR, compensated_step = %step_name, error = %e, "Compensation failed.");
          compensation_errors.push((step_name.to_string(), e.to_string()));
          step_ok = false;
        }
      }
      if step_ok {
        event!(Level::INFO, compensated_step = %step_name, "Step compensated.");
        compensated.push(step_name.to_string());
      }
    }

    StepFailure {
      step: failed_step,
      source,
      compensated,
      compensation_errors,
    }
  }
}
