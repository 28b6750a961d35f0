use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::fmt::Write as _;

use super::provider::PlanningProvider;
use crate::error::Result;
use crate::plan::{ActionType, ExecutionContext, PlanStep, StepStatus};

/// Deterministic planner used when the reasoning tool is unavailable
pub struct LocalPlanningProvider;

const CONTINUATION_STEPS: u32 = 2;

impl LocalPlanningProvider {
    pub const EMPTY_SUMMARY: &'static str = "No steps have been executed yet to summarize.";

    /// Action type suggested by keywords in the goal, checked in priority order
    pub fn classify(goal: &str) -> ActionType {
        const RULES: &[(&[&str], ActionType)] = &[
            (&["search", "find", "lookup"], ActionType::Context),
            (&["ui", "interface", "design"], ActionType::Ui),
            (&["code", "develop", "implement"], ActionType::Code),
            (&["doc", "readme"], ActionType::Documentation),
            (&["test", "build", "deploy"], ActionType::Cicd),
            (&["data", "analy", "report"], ActionType::Data),
        ];
        let goal = goal.to_lowercase();
        RULES
            .iter()
            .find(|(keywords, _)| keywords.iter().any(|k| goal.contains(k)))
            .map(|(_, action)| *action)
            .unwrap_or(ActionType::Manual)
    }

    fn describe(number: u32, action: ActionType, subject: &str, task: &str) -> String {
        let body = match action {
            ActionType::Context => format!("Research and gather information about \"{}\".", subject),
            ActionType::Ui => format!("Design and mock up a UI component for \"{}\".", subject),
            ActionType::Code => format!("Develop or modify code for \"{}\".", subject),
            ActionType::Documentation => format!("Write or update documentation for \"{}\".", subject),
            ActionType::Cicd => format!(
                "Run the test, build or deployment tasks needed for \"{}\".",
                subject
            ),
            ActionType::Data => format!("Process, analyze or report on data for \"{}\".", subject),
            _ => format!("Review progress and decide next actions for \"{}\".", subject),
        };
        format!("Fallback Step {} ({}): {}", number, task, body)
    }

    fn snippet(text: &str, max: usize) -> String {
        if text.chars().count() > max {
            format!("{}...", text.chars().take(max).collect::<String>())
        } else {
            text.to_string()
        }
    }

    fn fresh_id(number: u32, taken: &HashSet<&str>) -> String {
        let base = format!("fallback-{}", number);
        if !taken.contains(base.as_str()) {
            return base;
        }
        let mut suffix = 2;
        loop {
            let candidate = format!("{}-{}", base, suffix);
            if !taken.contains(candidate.as_str()) {
                return candidate;
            }
            suffix += 1;
        }
    }

    pub fn plan(goal: &str, count: usize) -> Vec<PlanStep> {
        let first_action = Self::classify(goal);
        let subject = Self::snippet(goal, 50);
        (1..=count.max(1) as u32)
            .map(|number| {
                let action = if number == 1 {
                    first_action
                } else {
                    ActionType::Manual
                };
                let task = format!("Task {}", number);
                PlanStep::new(format!("fallback-{}", number), number, task.clone())
                    .with_description(Self::describe(number, action, &subject, &task))
                    .with_action(action)
                    .with_data(json!({
                        "goal": goal,
                        "fallbackReason": "Plan generation tool failed or returned no steps."
                    }))
            })
            .collect()
    }

    pub fn continuation(current: &[PlanStep]) -> Vec<PlanStep> {
        let taken: HashSet<&str> = current.iter().map(|s| s.id.as_str()).collect();
        let last_number = current.iter().map(|s| s.number).max().unwrap_or(0);
        let subject = current
            .last()
            .map(|last| {
                last.data
                    .get("goal")
                    .and_then(|g| g.as_str())
                    .map(|g| Self::snippet(g, 50))
                    .unwrap_or_else(|| Self::snippet(&last.description, 30))
            })
            .unwrap_or_else(|| "continued plan".to_string());

        (1..=CONTINUATION_STEPS)
            .map(|offset| {
                let number = last_number + offset;
                let task = format!("Continuation Task {}", offset);
                PlanStep::new(Self::fresh_id(number, &taken), number, task.clone())
                    .with_description(Self::describe(number, ActionType::Manual, &subject, &task))
                    .with_data(json!({
                        "originalPlanLength": current.len(),
                        "fallbackReason": "Plan continuation tool failed or returned no new steps."
                    }))
            })
            .collect()
    }

    pub fn summary(steps: &[PlanStep], context: &ExecutionContext) -> String {
        if steps.is_empty() {
            return Self::EMPTY_SUMMARY.to_string();
        }
        let count = |status: StepStatus| steps.iter().filter(|s| s.status == status).count();

        let mut out = format!("Fallback Summary: {} step(s) processed.\n", steps.len());
        let _ = writeln!(out, "- {} completed successfully.", count(StepStatus::Success));
        let failed = count(StepStatus::Failed);
        if failed > 0 {
            let _ = writeln!(out, "- {} failed.", failed);
        }
        let skipped = count(StepStatus::Skipped);
        if skipped > 0 {
            let _ = writeln!(out, "- {} skipped.", skipped);
        }

        out.push_str("\nKey Step Details:\n");
        for step in steps {
            let label = if step.description.is_empty() {
                &step.name
            } else {
                &step.description
            };
            let _ = writeln!(
                out,
                "  Step {}: \"{}\" - Status: {}",
                step.number,
                Self::snippet(label, 70),
                step.status
            );
            if let Some(result) = context.get(&step.id) {
                if !result.summary.is_empty() {
                    let _ = writeln!(out, "    Outcome: {}", Self::snippet(&result.summary, 100));
                }
                if let Some(error) = &result.error {
                    let _ = writeln!(out, "    Error: {}", Self::snippet(error, 100));
                }
            }
        }
        out
    }
}

#[async_trait]
impl PlanningProvider for LocalPlanningProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn initial_steps(&self, goal: &str, count: usize) -> Result<Vec<PlanStep>> {
        Ok(Self::plan(goal, count))
    }

    async fn next_steps(&self, current: &[PlanStep]) -> Result<Vec<PlanStep>> {
        Ok(Self::continuation(current))
    }

    async fn summarize(&self, steps: &[PlanStep], context: &ExecutionContext) -> Result<String> {
        Ok(Self::summary(steps, context))
    }
}
