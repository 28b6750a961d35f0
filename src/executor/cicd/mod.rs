//! CI/CD executor: lint, test, build, deploy, verify and notify steps

mod build;
mod deploy;
mod lint;
mod notify;
mod verify;

pub use build::{Artifact, BuildConfig, BuildReport};
pub use deploy::{DeployConfig, DeployReport};
pub use lint::{LintConfig, LintReport, LinterOutcome};
pub use notify::{ChannelOutcome, NotifyConfig, NotifyReport};
pub use run_tests::{TestConfig, TestReport};
pub use verify::{EndpointSpec, HealthCheck, SmokeTestOutcome, VerifyConfig, VerifyReport};

use async_trait::async_trait;
use std::str::FromStr;
use tracing::info;

use super::common::recover;
use super::{Executor, ExecutorDeps};
use crate::error::{common, EngineError};
use crate::plan::{Domain, ExecutionContext, ExecutionResult, PlanStep, ResultKind};

/// Configuration section read by this executor
pub(crate) const SECTION: &str = "cicd";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CicdStep {
    Lint,
    Test,
    Build,
    Deploy,
    Verify,
    Notify,
}

impl CicdStep {
    pub fn kind(&self) -> ResultKind {
        match self {
            CicdStep::Lint => ResultKind::Lint,
            CicdStep::Test => ResultKind::Test,
            CicdStep::Build => ResultKind::Build,
            CicdStep::Deploy => ResultKind::Deploy,
            CicdStep::Verify => ResultKind::Verify,
            CicdStep::Notify => ResultKind::Notify,
        }
    }
}

impl FromStr for CicdStep {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lint" => Ok(CicdStep::Lint),
            "test" => Ok(CicdStep::Test),
            "build" => Ok(CicdStep::Build),
            "deploy" => Ok(CicdStep::Deploy),
            "verify" => Ok(CicdStep::Verify),
            "notify" => Ok(CicdStep::Notify),
            other => Err(common::unknown_step("CI/CD", other)),
        }
    }
}

pub struct CicdExecutor {
    deps: ExecutorDeps,
}

impl CicdExecutor {
    pub fn new(deps: ExecutorDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Executor for CicdExecutor {
    fn domain(&self) -> Domain {
        Domain::Cicd
    }

    async fn execute_step(
        &self,
        step: &PlanStep,
        context: &ExecutionContext,
    ) -> Result<ExecutionResult, EngineError> {
        let kind: CicdStep = step.id.parse()?;
        info!(step_id = %step.id, domain = "cicd", "Executing CI/CD step");

        let outcome = match kind {
            CicdStep::Lint => lint::execute(&self.deps, step).await,
            CicdStep::Test => run_tests::execute(&self.deps, step).await,
            CicdStep::Build => build::execute(&self.deps, step).await,
            CicdStep::Deploy => deploy::execute(&self.deps, step, context).await,
            CicdStep::Verify => verify::execute(&self.deps, step, context).await,
            CicdStep::Notify => notify::execute(&self.deps, step, context).await,
        };
        Ok(recover(kind.kind(), &step.id, outcome))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::{ConfigStore, EngineSettings};
    use crate::executor::ExecutorDeps;
    use crate::subprocess::MockProcessRunner;
    use serde_json::Value;
    use std::path::Path;
    use std::sync::Arc;

    pub fn deps(runner: &MockProcessRunner, config: Value, working_dir: &Path) -> ExecutorDeps {
        ExecutorDeps::new(
            Arc::new(runner.clone()),
            Arc::new(ConfigStore::from_value(config)),
            EngineSettings::default().with_working_dir(working_dir),
        )
        .unwrap()
    }
}
