//! # seqplan
//!
//! Sequential workflow planning and execution.
//!
//! Domain planners turn parameters into dependency-linked plans, domain
//! executors run each step, and the execution engine walks a plan in
//! dependency order, skipping steps whose dependencies did not succeed.
//! Goal-driven plans come from an external reasoning tool with a local
//! deterministic fallback.
//!
//! ## Modules
//!
//! - `config` - Layered per-domain configuration and typed settings
//! - `engine` - Sequential plan execution and run reports
//! - `error` - Crate-wide error type with numeric codes
//! - `executor` - CI/CD, data, documentation and general step executors
//! - `plan` - Plan, step, result and context data model
//! - `planner` - Template planners for the cicd, data and documentation domains
//! - `planning` - Goal-driven planning service over external tools
//! - `runtime` - One handle wiring the above together
//! - `subprocess` - Process execution abstraction with a mock runner
//! - `tools` - JSON-RPC tool clients
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod plan;
pub mod planner;
pub mod planning;
pub mod runtime;
pub mod subprocess;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{ExecutionEngine, RunReport};
pub use error::{EngineError, ErrorCode, Result};
pub use plan::{Domain, ExecutionContext, ExecutionResult, Plan, PlanStep};
pub use runtime::Runtime;
