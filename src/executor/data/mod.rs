//! Data executor: collect, validate, transform, analyze, visualize and store.
//!
//! Records are JSON objects. Each step reads the most processed record set
//! recorded so far and carries its own output forward in its report.

mod analyze;
mod collect;
mod store;
mod transform;
mod validate;
mod visualize;

pub use analyze::{AnalyzeConfig, AnalyzeReport, Correlation, FieldStats};
pub use collect::{CollectConfig, CollectReport, SourceSpec, SourceStatus};
pub use store::{StoreConfig, StoreReport, StoredFile};
pub use transform::{AppliedTransformation, TransformConfig, TransformReport, Transformation};
pub use validate::{ConsistencyRule, RecordIssue, ValidateConfig, ValidateReport, ValidationMode};
pub use visualize::{VisualArtifact, VisualizeConfig, VisualizeReport};

use async_trait::async_trait;
use std::str::FromStr;
use tracing::info;

use super::common::recover;
use super::{Executor, ExecutorDeps};
use crate::error::{common, EngineError};
use crate::plan::{Domain, ExecutionContext, ExecutionResult, PlanStep, ResultKind};

pub(crate) const SECTION: &str = "data";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataStep {
    Collect,
    Validate,
    Transform,
    Analyze,
    Visualize,
    Store,
}

impl DataStep {
    pub fn kind(&self) -> ResultKind {
        match self {
            DataStep::Collect => ResultKind::Collect,
            DataStep::Validate => ResultKind::Validate,
            DataStep::Transform => ResultKind::Transform,
            DataStep::Analyze => ResultKind::Analyze,
            DataStep::Visualize => ResultKind::Visualize,
            DataStep::Store => ResultKind::Store,
        }
    }
}

impl FromStr for DataStep {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "collect" => Ok(DataStep::Collect),
            "validate" => Ok(DataStep::Validate),
            "transform" => Ok(DataStep::Transform),
            "analyze" => Ok(DataStep::Analyze),
            "visualize" => Ok(DataStep::Visualize),
            "store" => Ok(DataStep::Store),
            other => Err(common::unknown_step("data", other)),
        }
    }
}

pub struct DataExecutor {
    deps: ExecutorDeps,
}

impl DataExecutor {
    pub fn new(deps: ExecutorDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Executor for DataExecutor {
    fn domain(&self) -> Domain {
        Domain::Data
    }

    async fn execute_step(
        &self,
        step: &PlanStep,
        context: &ExecutionContext,
    ) -> Result<ExecutionResult, EngineError> {
        let kind: DataStep = step.id.parse()?;
        info!(step_id = %step.id, domain = "data", "Executing data step");

        let outcome = match kind {
            DataStep::Collect => collect::execute(&self.deps, step).await,
            DataStep::Validate => validate::execute(step, context),
            DataStep::Transform => transform::execute(step, context),
            DataStep::Analyze => analyze::execute(&self.deps, step, context).await,
            DataStep::Visualize => visualize::execute(&self.deps, step, context).await,
            DataStep::Store => store::execute(&self.deps, step, context).await,
        };
        Ok(recover(kind.kind(), &step.id, outcome))
    }
}
