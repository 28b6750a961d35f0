//! Sequential plan execution
//!
//! The engine walks a validated plan in dependency order, hands each ready
//! step to the domain executor and records the result before any dependent
//! step runs. A step runs only when every dependency succeeded; otherwise it
//! is skipped, which cascades through its own dependents.

mod report;

pub use report::{RunReport, StatusCounts, StepOutcome};

use chrono::Utc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{EngineError, ErrorCode, Result};
use crate::executor::Executor;
use crate::plan::{ExecutionContext, Plan, PlanStatus, StepStatus};

pub struct ExecutionEngine {
    executor: Box<dyn Executor>,
}

/// Why a pending step cannot run, if it cannot
fn blocked_by(plan: &Plan, index: usize) -> Option<String> {
    plan.steps[index].depends_on.iter().find_map(|dep| {
        let status = plan.step(dep).map(|s| s.status).unwrap_or_default();
        (status != StepStatus::Success)
            .then(|| format!("Dependency '{}' did not succeed ({})", dep, status))
    })
}

impl ExecutionEngine {
    pub fn new(executor: Box<dyn Executor>) -> Self {
        Self { executor }
    }

    /// Run every step of `plan`. Construction errors (invalid dependency
    /// graph, domain mismatch) are returned before any step runs; step
    /// failures are reported in the [`RunReport`].
    pub async fn run(&self, mut plan: Plan) -> Result<RunReport> {
        if plan.domain != self.executor.domain() {
            return Err(EngineError::plan_with_code(
                ErrorCode::PLAN_UNSUPPORTED_DOMAIN,
                format!(
                    "Plan domain '{}' does not match the {} executor",
                    plan.domain,
                    self.executor.domain()
                ),
                None,
            ));
        }
        let order = plan.execution_order()?;
        if let Some(step) = plan.steps.iter().find(|s| s.status != StepStatus::Pending) {
            return Err(EngineError::workflow_with_code(
                ErrorCode::WORKFLOW_INVALID_TRANSITION,
                format!("Step '{}' is already {}; plans run once", step.id, step.status),
            )
            .with_plan(plan.id.clone()));
        }

        let started_at = Utc::now();
        let run_start = Instant::now();
        plan.status = PlanStatus::Running;
        info!(plan_id = %plan.id, domain = %plan.domain, steps = plan.steps.len(), "Starting plan run");

        let mut context = ExecutionContext::new();
        let mut outcomes = Vec::with_capacity(order.len());
        let mut abort_reason: Option<String> = None;

        for index in order {
            let blocked = match &abort_reason {
                Some(reason) => Some(format!("Run aborted: {}", reason)),
                None => blocked_by(&plan, index),
            };
            let step = &mut plan.steps[index];
            if let Some(reason) = blocked {
                debug!(step_id = %step.id, reason = %reason, "Skipping step");
                step.transition(StepStatus::Skipped)?;
                outcomes.push(StepOutcome {
                    step_id: step.id.clone(),
                    number: step.number,
                    status: StepStatus::Skipped,
                    duration_ms: 0,
                    summary: None,
                    reason: Some(reason),
                });
                continue;
            }

            step.transition(StepStatus::Running)?;
            info!(step_id = %step.id, number = step.number, name = %step.name, "Running step");
            let step_start = Instant::now();
            let outcome = self.executor.execute_step(step, &context).await;
            let duration_ms = step_start.elapsed().as_millis() as u64;

            match outcome {
                Ok(result) => {
                    let status = if result.success {
                        StepStatus::Success
                    } else {
                        StepStatus::Failed
                    };
                    step.transition(status)?;
                    if result.success {
                        info!(step_id = %step.id, duration_ms, summary = %result.summary, "Step succeeded");
                    } else {
                        warn!(step_id = %step.id, duration_ms, error = ?result.error, "Step failed");
                    }
                    outcomes.push(StepOutcome {
                        step_id: step.id.clone(),
                        number: step.number,
                        status,
                        duration_ms,
                        summary: Some(result.summary.clone()),
                        reason: result.error.clone(),
                    });
                    context.record(result)?;
                }
                Err(e) => {
                    error!(step_id = %step.id, error = %e, "Step could not be executed; aborting run");
                    step.transition(StepStatus::Failed)?;
                    outcomes.push(StepOutcome {
                        step_id: step.id.clone(),
                        number: step.number,
                        status: StepStatus::Failed,
                        duration_ms,
                        summary: None,
                        reason: Some(e.user_message()),
                    });
                    abort_reason = Some(e.user_message());
                }
            }
        }

        plan.status = if plan.steps.iter().any(|s| s.status == StepStatus::Failed) {
            PlanStatus::Failed
        } else {
            PlanStatus::Completed
        };
        let report = RunReport {
            plan,
            outcomes,
            context,
            started_at,
            finished_at: Utc::now(),
            duration_ms: run_start.elapsed().as_millis() as u64,
            abort_reason,
        };
        let counts = report.counts();
        info!(
            plan_id = %report.plan.id,
            status = %report.plan.status,
            success = counts.success,
            failed = counts.failed,
            skipped = counts.skipped,
            duration_ms = report.duration_ms,
            "Plan run finished"
        );
        Ok(report)
    }
}
