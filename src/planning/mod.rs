//! Sequential planning service
//!
//! Produces and extends goal-driven plans through the reasoning tool, with a
//! deterministic local fallback (see [`TieredPlanner`]), and resolves the
//! `context` and `ui` step types through their own tool families.

pub mod fallback;
pub mod knowledge;
pub mod provider;
pub mod tool;
pub mod ui;

pub use fallback::LocalPlanningProvider;
pub use knowledge::ContextReport;
pub use provider::{PlanningProvider, TieredPlanner};
pub use tool::ToolPlanningProvider;
pub use ui::{default_component_name, UiReport, UiRequest};

use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::PlanningSettings;
use crate::error::Result;
use crate::plan::{Domain, ExecutionContext, ExecutionResult, Plan, PlanStep};
use crate::tools::{HttpToolClient, ToolClient, UnconfiguredToolClient};

pub struct PlanningService {
    planner: TieredPlanner,
    knowledge: Arc<dyn ToolClient>,
    ui: Arc<dyn ToolClient>,
    default_initial_steps: usize,
}

impl PlanningService {
    pub fn new(
        reasoning: Arc<dyn ToolClient>,
        knowledge: Arc<dyn ToolClient>,
        ui: Arc<dyn ToolClient>,
        settings: &PlanningSettings,
    ) -> Self {
        Self {
            planner: TieredPlanner::new(
                Box::new(ToolPlanningProvider::new(reasoning)),
                settings.tool_timeout,
            ),
            knowledge,
            ui,
            default_initial_steps: settings.initial_steps,
        }
    }

    /// Connect each tool family to its configured endpoint. Families without
    /// an endpoint fail every call, which routes planning to the fallback.
    pub fn from_settings(settings: &PlanningSettings) -> Result<Self> {
        let connect = |url: &Option<String>, family: &'static str| -> Result<Arc<dyn ToolClient>> {
            match url {
                Some(url) => {
                    let client = HttpToolClient::new(url, settings.tool_timeout)?
                        .with_api_key(settings.api_key.clone());
                    Ok(Arc::new(client))
                }
                None => Ok(Arc::new(UnconfiguredToolClient::new(family))),
            }
        };
        Ok(Self::new(
            connect(&settings.reasoning_url, "reasoning")?,
            connect(&settings.knowledge_url, "knowledge")?,
            connect(&settings.ui_url, "ui")?,
            settings,
        ))
    }

    pub fn default_initial_steps(&self) -> usize {
        self.default_initial_steps
    }

    pub async fn generate_plan(&self, goal: &str, initial_steps: usize) -> Result<Vec<PlanStep>> {
        let steps = self.planner.initial_steps(goal, initial_steps).await?;
        info!(step_count = steps.len(), "Generated plan steps");
        Ok(steps)
    }

    /// Wrap generated steps in a `general` plan
    pub async fn plan_for_goal(&self, goal: &str, initial_steps: usize) -> Result<Plan> {
        let steps = self.generate_plan(goal, initial_steps).await?;
        let plan = Plan::new(Domain::General, goal.trim(), format!("Plan for goal: {}", goal.trim()))
            .with_steps(steps)
            .with_metadata("goal", serde_json::Value::String(goal.to_string()));
        plan.validate()?;
        Ok(plan)
    }

    pub async fn continue_planning(&self, current: &[PlanStep]) -> Result<Vec<PlanStep>> {
        self.planner.next_steps(current).await
    }

    pub async fn execute_context_step(
        &self,
        step_id: &str,
        search_term: &str,
        library: Option<&str>,
    ) -> ExecutionResult {
        knowledge::lookup(self.knowledge.as_ref(), step_id, search_term, library).await
    }

    pub async fn execute_ui_step(
        &self,
        step_id: &str,
        request: &UiRequest,
        current_file: &Path,
        project_root: &Path,
    ) -> ExecutionResult {
        ui::build_component(self.ui.as_ref(), step_id, request, current_file, project_root).await
    }

    pub async fn generate_summary(&self, steps: &[PlanStep], context: &ExecutionContext) -> String {
        self.planner.summarize(steps, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::tools::{methods, MockToolClient};
    use serde_json::json;
    use std::time::Duration;

    fn service(reasoning: MockToolClient) -> PlanningService {
        let settings = PlanningSettings {
            tool_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        PlanningService::new(
            Arc::new(reasoning),
            Arc::new(MockToolClient::new()),
            Arc::new(MockToolClient::new()),
            &settings,
        )
    }

    #[tokio::test]
    async fn test_tool_failure_still_yields_steps_and_summary() {
        let svc = service(MockToolClient::new().fail(methods::SEQUENTIAL_THINKING, "offline"));

        let steps = svc.generate_plan("find rate limit docs", 3).await.unwrap();
        assert_eq!(steps.len(), 3);
        let more = svc.continue_planning(&steps).await.unwrap();
        assert_eq!(more.len(), 2);
        assert_eq!(more[0].number, 4);

        let summary = svc.generate_summary(&steps, &ExecutionContext::new()).await;
        assert!(!summary.is_empty());
    }

    #[tokio::test]
    async fn test_empty_tool_plan_falls_back() {
        let svc = service(MockToolClient::new().respond(
            methods::SEQUENTIAL_THINKING,
            json!({ "solution": { "plan": { "steps": [] } } }),
        ));
        let steps = svc.generate_plan("ship it", 2).await.unwrap();
        assert_eq!(steps.len(), 2);
        assert!(steps[0].id.starts_with("fallback-"));
    }

    #[tokio::test]
    async fn test_plan_for_goal_is_valid_general_plan() {
        let svc = service(MockToolClient::new().fail(methods::SEQUENTIAL_THINKING, "offline"));
        let plan = svc.plan_for_goal("Update the README", 2).await.unwrap();
        assert_eq!(plan.domain, Domain::General);
        assert_eq!(plan.steps.len(), 2);

        let err = svc.generate_plan("", 2).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::PLANNING_EMPTY_GOAL);
    }

    #[tokio::test]
    async fn test_unconfigured_service_uses_fallback() {
        let svc = PlanningService::from_settings(&PlanningSettings::default()).unwrap();
        let steps = svc.generate_plan("design a settings page", 1).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].action_type, crate::plan::ActionType::Ui);
    }
}
