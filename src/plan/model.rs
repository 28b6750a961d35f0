use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use super::step::PlanStep;
use crate::error::{EngineError, ErrorCode, Result};

/// Selects the planner and executor family for a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Cicd,
    Data,
    Documentation,
    /// Goal-driven plans produced by the planning service
    General,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Cicd => "cicd",
            Domain::Data => "data",
            Domain::Documentation => "documentation",
            Domain::General => "general",
        }
    }

    /// Name used in user-facing messages
    pub fn label(&self) -> &'static str {
        match self {
            Domain::Cicd => "CI/CD",
            Domain::Data => "data",
            Domain::Documentation => "documentation",
            Domain::General => "general",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cicd" | "ci-cd" | "ci/cd" | "ci" => Ok(Domain::Cicd),
            "data" => Ok(Domain::Data),
            "documentation" | "docs" | "doc" => Ok(Domain::Documentation),
            "general" | "goal" => Ok(Domain::General),
            other => Err(EngineError::plan_with_code(
                ErrorCode::PLAN_UNSUPPORTED_DOMAIN,
                format!("Unknown domain '{}'", other),
                None,
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Created,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlanStatus::Created => "created",
            PlanStatus::Running => "running",
            PlanStatus::Completed => "completed",
            PlanStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A named collection of dependency-linked steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub domain: Domain,
    pub steps: Vec<PlanStep>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: PlanStatus,
    /// Planner inputs worth reporting (pipeline type, workflow type)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Plan {
    pub fn new(domain: Domain, name: impl Into<String>, description: impl Into<String>) -> Self {
        let created_at = Utc::now();
        Self {
            id: format!("{}-plan-{}", domain, created_at.timestamp_millis()),
            name: name.into(),
            description: description.into(),
            domain,
            steps: Vec::new(),
            created_at,
            status: PlanStatus::Created,
            metadata: Map::new(),
        }
    }

    pub fn with_steps(mut self, steps: Vec<PlanStep>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn step(&self, id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn step_mut(&mut self, id: &str) -> Option<&mut PlanStep> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    pub fn step_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id.as_str()).collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| {
            EngineError::plan_with_code(
                ErrorCode::PLAN_INVALID_DOCUMENT,
                format!("Plan document is not valid: {}", e),
                None,
            )
        })
    }

    /// Read and validate a plan document
    pub async fn from_json_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| EngineError::from(e).with_context(path.display()))?;
        let plan = Self::from_json(&content)?;
        plan.validate()?;
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ActionType;

    #[test]
    fn test_domain_parsing() {
        assert_eq!("CI-CD".parse::<Domain>().unwrap(), Domain::Cicd);
        assert_eq!("docs".parse::<Domain>().unwrap(), Domain::Documentation);
        let err = "finance".parse::<Domain>().unwrap_err();
        assert_eq!(err.code(), ErrorCode::PLAN_UNSUPPORTED_DOMAIN);
    }

    #[test]
    fn test_plan_json_round_trip_keeps_shape() {
        let plan = Plan::new(Domain::Data, "Data processing Plan", "")
            .with_steps(vec![PlanStep::new("collect", 1, "Collect data")
                .with_action(ActionType::Extract)])
            .with_metadata("workflowType", Value::String("processing".into()));

        let json = plan.to_json().unwrap();
        assert!(json.contains("\"createdAt\""));
        assert!(json.contains("\"workflowType\""));
        let back = Plan::from_json(&json).unwrap();
        assert_eq!(back, plan);
    }

    #[test]
    fn test_invalid_document() {
        let err = Plan::from_json("{\"id\": 3}").unwrap_err();
        assert_eq!(err.code(), ErrorCode::PLAN_INVALID_DOCUMENT);
    }
}
