use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

use crate::error::{EngineError, Result};
use crate::plan::{ExecutionContext, Plan, PlanStatus, StepStatus};

/// Final state of one step after a run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub step_id: String,
    pub number: u32,
    pub status: StepStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Failure text, or why the step was skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Everything a run produced: the plan with final statuses, per-step
/// outcomes in execution order, and the recorded results
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub plan: Plan,
    pub outcomes: Vec<StepOutcome>,
    pub context: ExecutionContext,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
}

impl RunReport {
    pub fn status(&self) -> PlanStatus {
        self.plan.status
    }

    pub fn succeeded(&self) -> bool {
        self.plan.status == PlanStatus::Completed
    }

    pub fn outcome(&self, step_id: &str) -> Option<&StepOutcome> {
        self.outcomes.iter().find(|o| o.step_id == step_id)
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for outcome in &self.outcomes {
            match outcome.status {
                StepStatus::Success => counts.success += 1,
                StepStatus::Failed => counts.failed += 1,
                StepStatus::Skipped => counts.skipped += 1,
                StepStatus::Pending | StepStatus::Running => {}
            }
        }
        counts
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub async fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| EngineError::from(e).with_context(parent.display()))?;
        }
        tokio::fs::write(path, self.to_json()?)
            .await
            .map_err(|e| EngineError::from(e).with_context(path.display()))?;
        Ok(())
    }
}
