// seamline/src/registry.rs

//! `SagaRegistry<E>`: sagas keyed by their context data type.
//!
//! Each registered `Saga<TData, HandlerErr>` is wrapped so the registry can run
//! it from a type-erased context and report failures as the application error
//! type `E`.

use crate::core::context_data::ContextData;
use crate::core::control::SagaOutcome;
use crate::error::{SagaError, StepFailure};
use crate::saga::definition::Saga;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{event, instrument, Level};

#[async_trait]
trait AnySagaRunner<AppErr>: Send + Sync
where
  AppErr: std::error::Error + Send + Sync + 'static,
{
  fn saga_name(&self) -> &str;

  /// `ctx_obj` must hold a `ContextData<TData>` of the wrapped saga's type.
  async fn run_erased(&self, ctx_obj: Box<dyn Any + Send>) -> Result<SagaOutcome, AppErr>;
}

struct SagaWrapper<TData, HandlerErr, AppErr>
where
  TData: 'static + Send + Sync,
  HandlerErr: std::error::Error + From<SagaError> + Send + Sync + 'static,
  AppErr: std::error::Error + From<StepFailure<HandlerErr>> + From<SagaError> + Send + Sync + 'static,
{
  saga: Arc<Saga<TData, HandlerErr>>,
  _phantom_app_err: PhantomData<fn() -> AppErr>,
}

#[async_trait]
impl<TData, HandlerErr, AppErr> AnySagaRunner<AppErr> for SagaWrapper<TData, HandlerErr, AppErr>
where
  TData: 'static + Send + Sync,
  HandlerErr: std::error::Error + From<SagaError> + Send + Sync + 'static,
  AppErr: std::error::Error + From<StepFailure<HandlerErr>> + From<SagaError> + Send + Sync + 'static,
{
  fn saga_name(&self) -> &str {
    self.saga.name()
  }

  async fn run_erased(&self, ctx_obj: Box<dyn Any + Send>) -> Result<SagaOutcome, AppErr> {
    let typed_ctx_data = match ctx_obj.downcast::<ContextData<TData>>() {
      Ok(boxed_ctx_data) => *boxed_ctx_data,
      Err(_) => {
        let expected_type = std::any::type_name::<ContextData<TData>>();
        event!(Level::ERROR, "Context object type mismatch. Expected {}.", expected_type);
        return Err(AppErr::from(SagaError::TypeMismatch {
          site: "registry_dispatch".to_string(),
          expected_type: expected_type.to_string(),
        }));
      }
    };

    self.saga.run(typed_ctx_data).await.map_err(AppErr::from)
  }
}

/// Type-keyed saga registry. One saga per context data type.
pub struct SagaRegistry<AppErr = SagaError>
where
  AppErr: std::error::Error + From<SagaError> + Send + Sync + 'static,
{
  registry: RwLock<HashMap<TypeId, Arc<dyn AnySagaRunner<AppErr>>>>,
}

impl<AppErr> SagaRegistry<AppErr>
where
  AppErr: std::error::Error + From<SagaError> + Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self {
      registry: RwLock::new(HashMap::new()),
    }
  }

  /// Registers `saga` for its context type, replacing any earlier registration.
  pub fn register<TData, HandlerErr>(&self, saga: Saga<TData, HandlerErr>)
  where
    TData: 'static + Send + Sync,
    HandlerErr: std::error::Error + From<SagaError> + Send + Sync + 'static,
    AppErr: From<StepFailure<HandlerErr>>,
  {
    event!(
      Level::DEBUG,
      saga = %saga.name(),
      tdata_type = %std::any::type_name::<TData>(),
      "Registering saga."
    );
    let wrapper = SagaWrapper::<TData, HandlerErr, AppErr> {
      saga: Arc::new(saga),
      _phantom_app_err: PhantomData,
    };
    self.registry.write().insert(TypeId::of::<TData>(), Arc::new(wrapper));
  }

  pub fn is_registered<TData: 'static + Send + Sync>(&self) -> bool {
    self.registry.read().contains_key(&TypeId::of::<TData>())
  }

  /// Runs the saga registered for `TData`.
  #[instrument(
        name = "SagaRegistry::run",
        skip_all,
        fields(tdata_type = %std::any::type_name::<TData>())
    )]
  pub async fn run<TData>(&self, ctx_data: ContextData<TData>) -> Result<SagaOutcome, AppErr>
  where
    TData: 'static + Send + Sync,
  {
    let runner = {
      let reg = self.registry.read();
      reg.get(&TypeId::of::<TData>()).cloned()
    };
    let runner = runner.ok_or_else(|| {
      let type_name = std::any::type_name::<TData>();
      event!(Level::ERROR, "No saga registered for TData type {}.", type_name);
      AppErr::from(SagaError::SagaNotRegistered {
        context_type: type_name.to_string(),
      })
    })?;

    event!(Level::DEBUG, saga = %runner.saga_name(), "Dispatching saga.");
    runner.run_erased(Box::new(ctx_data)).await
  }
}

impl<AppErr> Default for SagaRegistry<AppErr>
where
  AppErr: std::error::Error + From<SagaError> + Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}
