//! Wiring of configuration, planners, executors and the planning service
//! behind one handle, as used by the CLI.

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

use crate::config::{ConfigProvider, ConfigStore, EngineSettings};
use crate::engine::{ExecutionEngine, RunReport};
use crate::error::Result;
use crate::executor::{executor_for, ExecutorDeps};
use crate::plan::{Domain, Plan, PlanStep};
use crate::planner::planner_for;
use crate::planning::PlanningService;
use crate::subprocess::{production_runner, ProcessRunner};

pub struct Runtime {
    config: Arc<dyn ConfigProvider>,
    settings: EngineSettings,
    runner: Arc<dyn ProcessRunner>,
    planning: Arc<PlanningService>,
}

impl Runtime {
    /// Real subprocesses and tool endpoints from the `planning` section
    pub fn from_config(store: ConfigStore) -> Result<Self> {
        let planning = PlanningService::from_settings(&store.planning_settings())?;
        Ok(Self::new(store, production_runner(), planning))
    }

    pub fn new(
        store: ConfigStore,
        runner: Arc<dyn ProcessRunner>,
        planning: PlanningService,
    ) -> Self {
        let settings = store.engine_settings();
        Self {
            config: Arc::new(store),
            settings,
            runner,
            planning: Arc::new(planning),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn planning(&self) -> &PlanningService {
        &self.planning
    }

    pub fn create_plan(&self, domain: Domain, params: &Map<String, Value>) -> Result<Plan> {
        let plan = planner_for(domain, self.config.clone())?.create_plan(params)?;
        info!(plan_id = %plan.id, domain = %domain, steps = plan.steps.len(), "Created plan");
        Ok(plan)
    }

    /// `initial_steps` of `None` uses the configured default
    pub async fn plan_goal(&self, goal: &str, initial_steps: Option<usize>) -> Result<Plan> {
        let count = initial_steps.unwrap_or_else(|| self.planning.default_initial_steps());
        self.planning.plan_for_goal(goal, count).await
    }

    pub async fn continue_planning(&self, steps: &[PlanStep]) -> Result<Vec<PlanStep>> {
        self.planning.continue_planning(steps).await
    }

    pub async fn execute(&self, plan: Plan) -> Result<RunReport> {
        let deps = ExecutorDeps::new(self.runner.clone(), self.config.clone(), self.settings.clone())?;
        let executor = executor_for(plan.domain, deps, self.planning.clone());
        ExecutionEngine::new(executor).run(plan).await
    }

    /// Narrative summary of a finished run from the planning service
    pub async fn summarize(&self, report: &RunReport) -> String {
        self.planning
            .generate_summary(&report.plan.steps, &report.context)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlanningSettings;
    use crate::plan::{PlanStatus, StepStatus};
    use crate::subprocess::MockProcessRunner;
    use crate::tools::{methods, MockToolClient};
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    fn runtime(dir: &TempDir, runner: MockProcessRunner) -> Runtime {
        let store = ConfigStore::from_value(json!({
            "engine": { "workingDir": dir.path(), "processTimeout": "10s" }
        }));
        let offline = MockToolClient::new().fail(methods::SEQUENTIAL_THINKING, "offline");
        let planning = PlanningService::new(
            Arc::new(offline),
            Arc::new(MockToolClient::new()),
            Arc::new(MockToolClient::new()),
            &PlanningSettings {
                tool_timeout: Duration::from_secs(1),
                ..Default::default()
            },
        );
        Runtime::new(store, Arc::new(runner), planning)
    }

    #[tokio::test]
    async fn test_goal_plan_runs_as_manual_steps() {
        let tmp = TempDir::new().unwrap();
        let rt = runtime(&tmp, MockProcessRunner::new());

        let plan = rt.plan_goal("Write release notes", Some(2)).await.unwrap();
        assert_eq!(plan.domain, Domain::General);
        let report = rt.execute(plan).await.unwrap();
        assert_eq!(report.status(), PlanStatus::Completed);
        assert!(report
            .plan
            .steps
            .iter()
            .all(|s| s.status == StepStatus::Success));
        assert!(!rt.summarize(&report).await.is_empty());
    }

    #[test]
    fn test_general_domain_has_no_template_planner() {
        let tmp = TempDir::new().unwrap();
        let rt = runtime(&tmp, MockProcessRunner::new());
        assert!(rt.create_plan(Domain::General, &Map::new()).is_err());
    }
}
