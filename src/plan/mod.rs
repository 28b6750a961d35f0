//! Plan data model
//!
//! A [`Plan`] is a dependency-linked set of [`PlanStep`]s emitted by a planner
//! or the planning service. Executors turn steps into [`ExecutionResult`]s,
//! which the engine folds into an [`ExecutionContext`].

pub mod context;
pub mod model;
pub mod result;
pub mod step;
mod validation;

pub use context::ExecutionContext;
pub use model::{Domain, Plan, PlanStatus};
pub use result::{ExecutionResult, ResultData, ResultKind};
pub use step::{ActionType, PlanStep, StepStatus};
