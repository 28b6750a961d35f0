use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::fallback::LocalPlanningProvider;
use crate::error::{EngineError, ErrorCode, Result};
use crate::plan::{ExecutionContext, PlanStep};

/// Source of plan steps and run summaries
#[async_trait]
pub trait PlanningProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Steps for a new plan. `count` is a hint, not a contract.
    async fn initial_steps(&self, goal: &str, count: usize) -> Result<Vec<PlanStep>>;

    /// Steps that extend `current`, numbered after its highest number
    async fn next_steps(&self, current: &[PlanStep]) -> Result<Vec<PlanStep>>;

    async fn summarize(&self, steps: &[PlanStep], context: &ExecutionContext) -> Result<String>;
}

/// Primary provider with a deterministic local fallback.
///
/// Any error, timeout or empty answer from the primary yields the fallback's
/// output, so callers always get a non-empty step list or summary.
pub struct TieredPlanner {
    primary: Box<dyn PlanningProvider>,
    fallback: LocalPlanningProvider,
    timeout: Duration,
}

impl TieredPlanner {
    pub fn new(primary: Box<dyn PlanningProvider>, timeout: Duration) -> Self {
        Self {
            primary,
            fallback: LocalPlanningProvider,
            timeout,
        }
    }

    /// Tiered planner whose primary tier is the local generator itself
    pub fn local_only() -> Self {
        Self::new(Box::new(LocalPlanningProvider), Duration::from_secs(1))
    }

    pub async fn initial_steps(&self, goal: &str, count: usize) -> Result<Vec<PlanStep>> {
        if goal.trim().is_empty() {
            return Err(EngineError::planning_with_code(
                ErrorCode::PLANNING_EMPTY_GOAL,
                "Goal is required and cannot be empty",
                None,
            ));
        }
        let count = count.max(1);
        match self
            .attempt("initial_steps", self.primary.initial_steps(goal, count))
            .await
        {
            Some(steps) if !steps.is_empty() => Ok(steps),
            _ => self.fallback.initial_steps(goal, count).await,
        }
    }

    pub async fn next_steps(&self, current: &[PlanStep]) -> Result<Vec<PlanStep>> {
        if current.is_empty() {
            return Err(EngineError::planning_with_code(
                ErrorCode::PLANNING_EMPTY_STEPS,
                "Current plan is required and cannot be empty",
                None,
            ));
        }
        match self
            .attempt("next_steps", self.primary.next_steps(current))
            .await
        {
            Some(steps) if !steps.is_empty() => Ok(steps),
            _ => self.fallback.next_steps(current).await,
        }
    }

    pub async fn summarize(&self, steps: &[PlanStep], context: &ExecutionContext) -> String {
        if steps.is_empty() {
            return LocalPlanningProvider::EMPTY_SUMMARY.to_string();
        }
        match self
            .attempt("summarize", self.primary.summarize(steps, context))
            .await
        {
            Some(text) if !text.trim().is_empty() => text,
            _ => LocalPlanningProvider::summary(steps, context),
        }
    }

    async fn attempt<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Option<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => {
                debug!(provider = self.primary.name(), operation, "Primary planning provider answered");
                Some(value)
            }
            Ok(Err(e)) => {
                warn!(
                    provider = self.primary.name(),
                    operation,
                    error = %e,
                    "Primary planning provider failed, using local fallback"
                );
                None
            }
            Err(_) => {
                warn!(
                    provider = self.primary.name(),
                    operation,
                    timeout = ?self.timeout,
                    "Primary planning provider timed out, using local fallback"
                );
                None
            }
        }
    }
}
