// src/lib.rs

//! Seamline: an async saga engine for Rust.
//!
//! A saga is an ordered list of named steps run against one shared context.
//! Seamline gives you:
//!  - Named steps with one or more asynchronous `on` handlers.
//!  - Compensating actions registered per step, run in reverse order for every
//!    completed step when a later required step fails.
//!  - Best-effort (optional) steps whose failures are logged and skipped.
//!  - Early, successful halting of a saga from any handler.
//!  - Skip conditions evaluated against the live context.
//!  - A type-keyed registry for dispatching sagas by context type.

pub mod core;
pub mod error;
pub mod registry;
pub mod saga;

// --- Re-exports for the Public API ---

pub use crate::core::context::{Compensation, Handler};
pub use crate::core::context_data::ContextData;
pub use crate::core::control::{SagaOutcome, StepControl};
pub use crate::core::step::{SkipCondition, StepDef};

pub use crate::saga::definition::Saga;

pub use crate::error::{SagaError, SagaResult, StepFailure};

pub use crate::registry::SagaRegistry;

/*
    Typical use:
    1. Define a context struct `CheckoutCtx` holding everything the steps share.
    2. Create a `Saga<CheckoutCtx, AppError>` with its step list.
    3. Register handlers with `.on_step()` and compensations with `.compensate_with()`.
    4. Register the saga with a `SagaRegistry<AppError>`.
    5. Run it: `registry.run(ContextData::new(ctx)).await`.
       - `Ok(SagaOutcome::Completed)` / `Ok(SagaOutcome::Halted { .. })` on success.
       - `Err(e)` after compensations have run for a failed required step.
*/
