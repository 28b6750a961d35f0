use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{common, EngineError, ErrorCode, Result};

/// Category of work a step represents, independent of the executor handling it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    #[default]
    Manual,
    Context,
    Ui,
    Code,
    CodeAnalysis,
    Test,
    Build,
    Deploy,
    Extract,
    Transform,
    Load,
    Documentation,
    Cicd,
    Data,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Manual => "manual",
            ActionType::Context => "context",
            ActionType::Ui => "ui",
            ActionType::Code => "code",
            ActionType::CodeAnalysis => "code_analysis",
            ActionType::Test => "test",
            ActionType::Build => "build",
            ActionType::Deploy => "deploy",
            ActionType::Extract => "extract",
            ActionType::Transform => "transform",
            ActionType::Load => "load",
            ActionType::Documentation => "documentation",
            ActionType::Cicd => "cicd",
            ActionType::Data => "data",
        }
    }

    /// Accepts the spellings external tools use (`context-search`,
    /// `ui-component-design`, `code-analysis`). Unknown tags become `Manual`.
    pub fn parse_lenient(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "context" | "context_search" | "search" => ActionType::Context,
            "ui" | "ui_component" | "ui_component_design" | "ui_design" => ActionType::Ui,
            "code" | "code_generation" => ActionType::Code,
            "code_analysis" | "analysis" => ActionType::CodeAnalysis,
            "test" | "testing" => ActionType::Test,
            "build" => ActionType::Build,
            "deploy" | "deployment" => ActionType::Deploy,
            "extract" => ActionType::Extract,
            "transform" => ActionType::Transform,
            "load" => ActionType::Load,
            "documentation" | "docs" => ActionType::Documentation,
            "cicd" | "ci_cd" => ActionType::Cicd,
            "data" => ActionType::Data,
            _ => ActionType::Manual,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Success | StepStatus::Failed | StepStatus::Skipped
        )
    }

    /// `pending -> running -> success | failed`, and `pending -> skipped`
    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (StepStatus::Pending, StepStatus::Running)
                | (StepStatus::Pending, StepStatus::Skipped)
                | (StepStatus::Running, StepStatus::Success)
                | (StepStatus::Running, StepStatus::Failed)
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Success => "success",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// One unit of work in a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    pub id: String,
    pub number: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub action_type: ActionType,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Executor-specific configuration
    #[serde(default)]
    pub data: Value,
}

impl PlanStep {
    pub fn new(id: impl Into<String>, number: u32, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            number,
            name: name.into(),
            description: String::new(),
            action_type: ActionType::Manual,
            status: StepStatus::Pending,
            depends_on: Vec::new(),
            data: Value::Object(Map::new()),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_action(mut self, action_type: ActionType) -> Self {
        self.action_type = action_type;
        self
    }

    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Decode `data` into a handler's typed configuration. `null` decodes as
    /// an empty object so all-default configurations need no payload.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T> {
        let payload = if self.data.is_null() {
            Value::Object(Map::new())
        } else {
            self.data.clone()
        };
        serde_json::from_value(payload).map_err(|e| {
            EngineError::validation_with_code(
                ErrorCode::VALIDATION_INVALID_DATA,
                format!("Invalid data for step '{}': {}", self.id, e),
                Some("data".to_string()),
            )
        })
    }

    /// Move along the status state machine
    pub fn transition(&mut self, next: StepStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(common::invalid_transition(&self.id, self.status, next));
        }
        tracing::trace!(step_id = %self.id, from = %self.status, to = %next, "Step status change");
        self.status = next;
        Ok(())
    }
}
