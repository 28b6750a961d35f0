use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::provider::PlanningProvider;
use crate::error::{EngineError, ErrorCode, Result};
use crate::plan::{ActionType, ExecutionContext, PlanStep};
use crate::tools::{methods, ToolClient};

/// Step as proposed by the reasoning tool. Everything except a description
/// or name is optional.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProposedStep {
    id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    action_type: Option<String>,
    #[serde(default)]
    data: Value,
    #[serde(default, alias = "dependsOn")]
    dependencies: Vec<Value>,
    estimated_duration: Option<String>,
    notes: Option<String>,
}

/// Planning provider backed by the `sequentialthinking` reasoning tool
pub struct ToolPlanningProvider {
    client: Arc<dyn ToolClient>,
}

impl ToolPlanningProvider {
    pub fn new(client: Arc<dyn ToolClient>) -> Self {
        Self { client }
    }

    async fn think(&self, thought: String, number: u32, total: u32) -> Result<Value> {
        let response = self
            .client
            .invoke(
                methods::SEQUENTIAL_THINKING,
                json!({
                    "thought": thought,
                    "nextThoughtNeeded": false,
                    "thoughtNumber": number,
                    "totalThoughts": total,
                }),
            )
            .await?;

        if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
            return Err(malformed(format!("tool reported an error: {}", error)));
        }
        Ok(response)
    }
}

fn malformed(reason: impl Into<String>) -> EngineError {
    EngineError::planning_with_code(
        ErrorCode::PLANNING_MALFORMED_RESPONSE,
        reason,
        Some(methods::SEQUENTIAL_THINKING.to_string()),
    )
}

fn proposed_steps(response: &Value, key: &str) -> Result<Vec<ProposedStep>> {
    let raw = response
        .pointer(&format!("/solution/plan/{}", key))
        .cloned()
        .ok_or_else(|| malformed(format!("response has no solution.plan.{}", key)))?;
    serde_json::from_value(raw).map_err(|e| malformed(format!("unreadable steps: {}", e)))
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Turn proposals into plan steps numbered after `existing`.
///
/// Ids that are missing or already taken are replaced. Dependencies may name
/// a step number or id; references that do not resolve to an earlier step are
/// dropped, which keeps the result acyclic.
fn materialize(proposals: Vec<ProposedStep>, existing: &[PlanStep]) -> Vec<PlanStep> {
    let first_number = existing.iter().map(|s| s.number).max().unwrap_or(0) + 1;
    let mut taken: HashSet<String> = existing.iter().map(|s| s.id.clone()).collect();
    let mut by_number: HashMap<u32, String> =
        existing.iter().map(|s| (s.number, s.id.clone())).collect();
    let mut by_proposed_id: HashMap<String, String> = HashMap::new();

    let mut steps = Vec::new();
    for proposal in proposals {
        let description = proposal
            .description
            .clone()
            .or_else(|| proposal.name.clone())
            .unwrap_or_default();
        if description.trim().is_empty() {
            debug!("Dropping proposed step without description");
            continue;
        }

        let number = first_number + steps.len() as u32;
        let id = match proposal.id.as_deref() {
            Some(id) if !id.is_empty() && !taken.contains(id) => id.to_string(),
            _ => format!("step-{}", Uuid::new_v4()),
        };

        let depends_on: Vec<String> = proposal
            .dependencies
            .iter()
            .filter_map(|dep| match dep {
                Value::Number(n) => n
                    .as_u64()
                    .and_then(|n| by_number.get(&(n as u32)).cloned()),
                Value::String(s) => by_proposed_id
                    .get(s)
                    .cloned()
                    .or_else(|| taken.contains(s).then(|| s.clone()))
                    .or_else(|| s.parse::<u32>().ok().and_then(|n| by_number.get(&n).cloned())),
                _ => None,
            })
            .filter(|dep| dep != &id)
            .collect::<Vec<_>>();

        let mut data = match proposal.data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("input".to_string(), other);
                map
            }
        };
        if let Some(duration) = proposal.estimated_duration {
            data.insert("estimatedDuration".to_string(), Value::String(duration));
        }
        if let Some(notes) = proposal.notes {
            data.insert("notes".to_string(), Value::String(notes));
        }

        let name = proposal
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| truncate(&description, 60));
        let action = proposal
            .action_type
            .as_deref()
            .map(ActionType::parse_lenient)
            .unwrap_or_default();

        if let Some(original) = proposal.id {
            by_proposed_id.insert(original, id.clone());
        }
        by_number.insert(number, id.clone());
        taken.insert(id.clone());

        let mut deduped = Vec::new();
        for dep in depends_on {
            if !deduped.contains(&dep) {
                deduped.push(dep);
            }
        }
        steps.push(
            PlanStep::new(id, number, name)
                .with_description(description)
                .with_action(action)
                .depends_on(deduped)
                .with_data(Value::Object(data)),
        );
    }
    steps
}

#[async_trait]
impl PlanningProvider for ToolPlanningProvider {
    fn name(&self) -> &'static str {
        "reasoning-tool"
    }

    async fn initial_steps(&self, goal: &str, count: usize) -> Result<Vec<PlanStep>> {
        let thought = format!(
            "Goal: \"{}\". Generate an initial plan with approximately {} high-level steps. \
             Each step needs a description, an actionType (context-search, ui-component-design, \
             code, code-analysis, test, build, deploy, documentation, data, manual) and any input \
             data. Include dependencies as the step numbers each step relies on, plus \
             estimatedDuration and notes where useful.",
            goal, count
        );
        let response = self.think(thought, 1, 1).await?;
        let steps = materialize(proposed_steps(&response, "steps")?, &[]);
        info!(goal = %truncate(goal, 100), step_count = steps.len(), "Plan generated by reasoning tool");
        Ok(steps)
    }

    async fn next_steps(&self, current: &[PlanStep]) -> Result<Vec<PlanStep>> {
        let Some(last) = current.last() else {
            return Ok(Vec::new());
        };
        let thought = format!(
            "The current plan has {} steps. The last step (#{}) was \"{}\" with status \"{}\". \
             Generate the next 2-3 steps toward the overall goal, each with a description, \
             actionType, data and dependencies.",
            current.len(),
            last.number,
            truncate(&last.description, 100),
            last.status
        );
        let response = self.think(thought, last.number + 1, last.number + 3).await?;
        let steps = materialize(proposed_steps(&response, "newSteps")?, current);
        info!(new_step_count = steps.len(), "Plan continued by reasoning tool");
        Ok(steps)
    }

    async fn summarize(&self, steps: &[PlanStep], context: &ExecutionContext) -> Result<String> {
        let executed: Vec<Value> = steps
            .iter()
            .map(|s| {
                json!({
                    "number": s.number,
                    "description": truncate(&s.description, 100),
                    "status": s.status,
                    "resultSummary": context.get(&s.id).map(|r| truncate(&r.summary, 100)),
                })
            })
            .collect();
        let thought = format!(
            "The following plan steps have been executed: {}. Provide a concise overall summary \
             of what was accomplished, the final status, and any key outcomes or errors.",
            Value::Array(executed)
        );
        let response = self.think(thought, 1, 1).await?;
        response
            .pointer("/solution/summaryText")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| malformed("response has no solution.summaryText"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::MockToolClient;

    fn provider(mock: &MockToolClient) -> ToolPlanningProvider {
        ToolPlanningProvider::new(Arc::new(mock.clone()))
    }

    #[tokio::test]
    async fn test_maps_tool_steps() {
        let mock = MockToolClient::new().respond(
            methods::SEQUENTIAL_THINKING,
            json!({ "solution": { "plan": { "steps": [
                { "id": "research", "description": "Look up the retry API", "actionType": "context-search",
                  "data": { "searchTerm": "retry", "library": "tokio" } },
                { "description": "Write the wrapper", "actionType": "code", "dependencies": [1] },
                { "description": "Document it", "dependencies": ["research", 7, 3] }
            ] } } }),
        );
        let steps = provider(&mock).initial_steps("add retries", 3).await.unwrap();

        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].id, "research");
        assert_eq!(steps[0].action_type, ActionType::Context);
        assert_eq!(steps[1].number, 2);
        assert_eq!(steps[1].depends_on, vec!["research"]);
        assert_eq!(steps[2].action_type, ActionType::Manual);
        // 7 does not exist and 3 is the step itself
        assert_eq!(steps[2].depends_on, vec!["research"]);
        assert!(steps[1].id.starts_with("step-"));

        let (_, params) = &mock.calls()[0];
        assert!(params["thought"].as_str().unwrap().contains("add retries"));
        assert_eq!(params["thoughtNumber"], 1);
    }

    #[tokio::test]
    async fn test_continuation_renumbers_and_avoids_collisions() {
        let mock = MockToolClient::new().respond(
            methods::SEQUENTIAL_THINKING,
            json!({ "solution": { "plan": { "newSteps": [
                { "id": "a", "description": "Clashes with an existing id" },
                { "id": "c", "description": "Fresh", "dependencies": ["a", 2] }
            ] } } }),
        );
        let current = vec![PlanStep::new("a", 1, "A"), PlanStep::new("b", 2, "B")];
        let steps = provider(&mock).next_steps(&current).await.unwrap();

        assert_eq!(steps[0].number, 3);
        assert_ne!(steps[0].id, "a");
        assert_eq!(steps[1].id, "c");
        assert_eq!(steps[1].depends_on, vec![steps[0].id.clone(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_payload_is_an_error() {
        let mock = MockToolClient::new()
            .respond(methods::SEQUENTIAL_THINKING, json!({ "solution": {} }));
        let err = provider(&mock).initial_steps("anything", 3).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::PLANNING_MALFORMED_RESPONSE);

        let failing = MockToolClient::new().fail(methods::SEQUENTIAL_THINKING, "offline");
        assert!(provider(&failing)
            .summarize(&[PlanStep::new("a", 1, "A")], &ExecutionContext::new())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_summary_text_is_returned() {
        let mock = MockToolClient::new().respond(
            methods::SEQUENTIAL_THINKING,
            json!({ "solution": { "summaryText": "All good." } }),
        );
        let text = provider(&mock)
            .summarize(&[PlanStep::new("a", 1, "A")], &ExecutionContext::new())
            .await
            .unwrap();
        assert_eq!(text, "All good.");
    }
}
