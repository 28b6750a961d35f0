//! Domain executors
//!
//! An executor performs one step's concrete action and always answers with an
//! [`ExecutionResult`]. The only `Err` an executor returns is for a step id it
//! has no handler for; every other failure becomes a failed result.

pub mod cicd;
pub mod common;
pub mod data;
pub mod documentation;
pub mod general;

pub use cicd::CicdExecutor;
pub use data::DataExecutor;
pub use documentation::DocumentationExecutor;
pub use general::GeneralExecutor;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{ConfigProvider, EngineSettings};
use crate::error::{EngineError, Result};
use crate::plan::{Domain, ExecutionContext, ExecutionResult, PlanStep};
use crate::planning::PlanningService;
use crate::subprocess::ProcessRunner;

#[async_trait]
pub trait Executor: Send + Sync {
    fn domain(&self) -> Domain;

    async fn execute_step(
        &self,
        step: &PlanStep,
        context: &ExecutionContext,
    ) -> std::result::Result<ExecutionResult, EngineError>;
}

/// Collaborators shared by every executor
#[derive(Clone)]
pub struct ExecutorDeps {
    pub runner: Arc<dyn ProcessRunner>,
    pub http: reqwest::Client,
    pub config: Arc<dyn ConfigProvider>,
    pub settings: EngineSettings,
}

impl ExecutorDeps {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        config: Arc<dyn ConfigProvider>,
        settings: EngineSettings,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.http_timeout)
            .build()
            .map_err(|e| EngineError::config("Failed to build HTTP client").with_source(e))?;
        Ok(Self {
            runner,
            http,
            config,
            settings,
        })
    }
}

/// Build the executor for a plan's domain. `general` plans need the planning
/// service for their `context` and `ui` steps.
pub fn executor_for(
    domain: Domain,
    deps: ExecutorDeps,
    planning: Arc<PlanningService>,
) -> Box<dyn Executor> {
    match domain {
        Domain::Cicd => Box::new(CicdExecutor::new(deps)),
        Domain::Data => Box::new(DataExecutor::new(deps)),
        Domain::Documentation => Box::new(DocumentationExecutor::new(deps)),
        Domain::General => Box::new(GeneralExecutor::new(planning, deps.settings)),
    }
}
