//! Subprocess abstraction used by every executor that shells out.
//!
//! Executors never spawn processes directly; they receive an
//! `Arc<dyn ProcessRunner>` so tests can substitute [`MockProcessRunner`].

pub mod builder;
pub mod error;
pub mod mock;
pub mod runner;

#[cfg(test)]
mod tests;

pub use builder::ProcessCommandBuilder;
pub use error::ProcessError;
pub use mock::{MockCommandConfig, MockProcessRunner};
pub use runner::{ExitStatus, ProcessCommand, ProcessOutput, ProcessRunner, TokioProcessRunner};

use std::sync::Arc;

/// Runner that spawns real processes
pub fn production_runner() -> Arc<dyn ProcessRunner> {
    Arc::new(TokioProcessRunner)
}
