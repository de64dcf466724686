pub mod context;
pub mod context_data;
pub mod control;
pub mod step;

pub use context::{Compensation, Handler};
pub use context_data::ContextData;
pub use control::{SagaOutcome, StepControl};
pub use step::StepDef;
