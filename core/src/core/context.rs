// seamline/src/core/context.rs

//! Boxed handler and compensation types stored by a `Saga<TData, Err>`.

use crate::core::context_data::ContextData;
use crate::core::control::StepControl;
use std::future::Future;
use std::pin::Pin;

/// A step handler.
///
/// Receives a clone of the saga's `ContextData<TData>` and resolves to a
/// `StepControl` or the saga's error type.
///
/// Lock guards taken from the context (`.read()` / `.write()`) are blocking and
/// must be dropped before the handler reaches an `.await`.
pub type Handler<TData, Err> = Box<
  dyn Fn(ContextData<TData>) -> Pin<Box<dyn Future<Output = Result<StepControl, Err>> + Send>>
    + Send
    + Sync,
>;

/// A compensating action for a completed step. Runs only when a later
/// required step fails.
pub type Compensation<TData, Err> =
  Box<dyn Fn(ContextData<TData>) -> Pin<Box<dyn Future<Output = Result<(), Err>> + Send>> + Send + Sync>;
