//! Executor for goal-driven `general` plans.
//!
//! Steps come from the planning service, so the step id carries no meaning
//! here. Dispatch is on the step's action type instead: `context` and `ui`
//! go back to the planning service, everything else is acknowledged as work
//! for a person to carry out.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use super::Executor;
use crate::config::EngineSettings;
use crate::error::EngineError;
use crate::plan::{
    ActionType, Domain, ExecutionContext, ExecutionResult, PlanStep, ResultData, ResultKind,
};
use crate::planning::{PlanningService, UiRequest};

/// Payload of an acknowledged manual step
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualReport {
    pub action_type: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
}

pub struct GeneralExecutor {
    planning: Arc<PlanningService>,
    settings: EngineSettings,
}

fn data_str<'a>(step: &'a PlanStep, key: &str) -> Option<&'a str> {
    step.data
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// First non-empty of the step's description and name
fn step_text(step: &PlanStep) -> &str {
    let description = step.description.trim();
    if description.is_empty() {
        step.name.trim()
    } else {
        description
    }
}

impl GeneralExecutor {
    pub fn new(planning: Arc<PlanningService>, settings: EngineSettings) -> Self {
        Self { planning, settings }
    }

    /// `data.uiRequest` or the step's own fields, filled in from its text
    fn ui_request(step: &PlanStep) -> UiRequest {
        let mut request: UiRequest = step
            .data
            .get("uiRequest")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_else(|| UiRequest {
                message: data_str(step, "message").unwrap_or_default().to_string(),
                search_query: data_str(step, "searchQuery").unwrap_or_default().to_string(),
                context: data_str(step, "context").map(str::to_string),
            });
        if request.message.trim().is_empty() {
            request.message = step_text(step).to_string();
        }
        if request.search_query.trim().is_empty() {
            request.search_query = step.name.trim().to_string();
        }
        request
    }

    fn path_or_working_dir(&self, step: &PlanStep, key: &str) -> PathBuf {
        match data_str(step, key) {
            Some(path) => self.settings.resolve(path),
            None => self.settings.working_dir.clone(),
        }
    }

    fn acknowledge(step: &PlanStep) -> ExecutionResult {
        let report = ManualReport {
            action_type: step.action_type.to_string(),
            name: step.name.clone(),
            description: step.description.clone(),
            acknowledged_at: Some(Utc::now()),
        };
        let summary = format!(
            "Step {} ({}) acknowledged as a manual action: {}",
            step.number,
            step.action_type,
            step_text(step)
        );
        ExecutionResult::succeeded(ResultKind::Manual, &step.id, summary)
            .with_data(ResultData::Manual(report))
    }
}

#[async_trait]
impl Executor for GeneralExecutor {
    fn domain(&self) -> Domain {
        Domain::General
    }

    async fn execute_step(
        &self,
        step: &PlanStep,
        _context: &ExecutionContext,
    ) -> Result<ExecutionResult, EngineError> {
        info!(step_id = %step.id, action = %step.action_type, domain = "general", "Executing step");

        let result = match step.action_type {
            ActionType::Context => {
                let search_term = data_str(step, "searchTerm").unwrap_or_else(|| step_text(step));
                let library = data_str(step, "library");
                debug!(step_id = %step.id, search_term, library, "Looking up documentation");
                self.planning
                    .execute_context_step(&step.id, search_term, library)
                    .await
            }
            ActionType::Ui => {
                let request = Self::ui_request(step);
                let current_file = self.path_or_working_dir(step, "currentFile");
                let project_root = self.path_or_working_dir(step, "projectRoot");
                self.planning
                    .execute_ui_step(&step.id, &request, &current_file, &project_root)
                    .await
            }
            _ => Self::acknowledge(step),
        };
        Ok(result)
    }
}
