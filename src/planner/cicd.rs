use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

use super::{ParamResolver, Planner, StepData};
use crate::config::ConfigProvider;
use crate::error::Result;
use crate::plan::{ActionType, Domain, Plan, PlanStep};

/// Plans `lint -> test -> build [-> deploy -> verify] [-> notify]` pipelines
pub struct CicdPlanner {
    config: Arc<dyn ConfigProvider>,
}

impl CicdPlanner {
    pub fn new(config: Arc<dyn ConfigProvider>) -> Self {
        Self { config }
    }

    fn default_steps(r: &ParamResolver<'_>) -> Vec<PlanStep> {
        vec![
            PlanStep::new("lint", 1, "Lint code")
                .with_description("Run code linting to ensure code quality")
                .with_action(ActionType::CodeAnalysis)
                .with_data(
                    StepData::new()
                        .set("linters", r.value("linters", "linters", json!(["eslint"])))
                        .set("fix", r.flag("autoFix", "autoFix", false))
                        .build(),
                ),
            PlanStep::new("test", 2, "Run tests")
                .with_description("Execute test suite")
                .with_action(ActionType::Test)
                .depends_on(["lint"])
                .with_data(
                    StepData::new()
                        .set(
                            "testTypes",
                            r.value("testTypes", "testTypes", json!(["unit", "integration"])),
                        )
                        .set("coverage", r.flag("coverage", "coverage", true))
                        .set(
                            "coverageThreshold",
                            r.value("coverageThreshold", "coverageThreshold", json!(80)),
                        )
                        .build(),
                ),
            PlanStep::new("build", 3, "Build project")
                .with_description("Compile and build the project")
                .with_action(ActionType::Build)
                .depends_on(["test"])
                .with_data(
                    StepData::new()
                        .set("production", r.flag("production", "production", true))
                        .set("optimize", r.flag("optimize", "optimize", true))
                        .build(),
                ),
        ]
    }

    fn deployment_steps(r: &ParamResolver<'_>, first_number: u32) -> Vec<PlanStep> {
        let strategy = r
            .optional("deploymentStrategy", "deployStrategy")
            .or_else(|| r.optional("deployStrategy", "deploymentStrategy"))
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "standard".to_string());

        vec![
            PlanStep::new("deploy", first_number, "Deploy project")
                .with_description("Deploy the built project to target environment")
                .with_action(ActionType::Deploy)
                .depends_on(["build"])
                .with_data(
                    StepData::new()
                        .set(
                            "environment",
                            r.string("environment", "defaultEnvironment", "staging"),
                        )
                        .set("strategy", strategy)
                        .build(),
                ),
            PlanStep::new("verify", first_number + 1, "Verify deployment")
                .with_description("Verify the deployment was successful")
                .with_action(ActionType::Test)
                .depends_on(["deploy"])
                .with_data(
                    StepData::new()
                        .set("healthChecks", r.flag("healthChecks", "healthChecks", true))
                        .set("smokeTests", r.flag("smokeTests", "smokeTests", true))
                        .set_opt("endpoints", r.optional("healthEndpoints", "healthEndpoints"))
                        .build(),
                ),
        ]
    }

    fn notification_step(r: &ParamResolver<'_>, number: u32, after: &str) -> PlanStep {
        PlanStep::new("notify", number, "Send notifications")
            .with_description("Notify team members about pipeline results")
            .with_action(ActionType::Manual)
            .depends_on([after])
            .with_data(
                StepData::new()
                    .set(
                        "channels",
                        r.value("notificationChannels", "notificationChannels", json!(["log"])),
                    )
                    .set(
                        "onlyOnFailure",
                        r.flag("notifyOnlyOnFailure", "notifyOnlyOnFailure", false),
                    )
                    .set_opt("recipients", r.optional("recipients", "recipients"))
                    .set_opt("webhookUrl", r.optional("webhookUrl", "webhookUrl"))
                    .build(),
            )
    }
}

impl Planner for CicdPlanner {
    fn domain(&self) -> Domain {
        Domain::Cicd
    }

    fn create_plan(&self, params: &Map<String, Value>) -> Result<Plan> {
        let r = ParamResolver::new(params, self.config.get_config("cicd"));
        let pipeline_type = r.string("pipelineType", "defaultPipelineType", "standard");
        debug!(pipeline_type = %pipeline_type, "Creating CI/CD plan");

        let mut steps = Self::default_steps(&r);
        let deploys = matches!(pipeline_type.as_str(), "deployment" | "complete");
        if deploys {
            steps.extend(Self::deployment_steps(&r, steps.len() as u32 + 1));
        }
        if r.flag("notifications", "notifications", false) {
            let after = if deploys { "verify" } else { "build" };
            steps.push(Self::notification_step(&r, steps.len() as u32 + 1, after));
        }

        let plan = Plan::new(
            Domain::Cicd,
            r.param_string("name")
                .unwrap_or_else(|| format!("CI/CD {} Pipeline", pipeline_type)),
            r.param_string("description")
                .unwrap_or_else(|| format!("Plan for {} CI/CD workflow", pipeline_type)),
        )
        .with_steps(steps)
        .with_metadata("pipelineType", Value::String(pipeline_type));

        plan.validate()?;
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::test_support::{config, ids, params};

    #[test]
    fn test_standard_pipeline() {
        let planner = CicdPlanner::new(config(json!({})));
        let plan = planner.create_plan(&Map::new()).unwrap();

        assert_eq!(ids(&plan), vec!["lint", "test", "build"]);
        assert_eq!(plan.name, "CI/CD standard Pipeline");
        assert_eq!(plan.step("build").unwrap().depends_on, vec!["test"]);
        assert_eq!(plan.step("lint").unwrap().data["linters"], json!(["eslint"]));
        assert_eq!(plan.step("test").unwrap().data["coverageThreshold"], json!(80));
    }

    #[test]
    fn test_complete_pipeline_with_notifications() {
        let planner = CicdPlanner::new(config(json!({})));
        let plan = planner
            .create_plan(&params(json!({
                "pipelineType": "complete",
                "notifications": true,
                "environment": "production"
            })))
            .unwrap();

        assert_eq!(
            ids(&plan),
            vec!["lint", "test", "build", "deploy", "verify", "notify"]
        );
        let notify = plan.step("notify").unwrap();
        assert_eq!(notify.depends_on, vec!["verify"]);
        assert_eq!(notify.number, 6);
        assert_eq!(notify.data["channels"], json!(["log"]));
        assert_eq!(plan.step("deploy").unwrap().data["environment"], "production");
        assert_eq!(plan.metadata["pipelineType"], "complete");
    }

    #[test]
    fn test_notify_depends_on_build_without_deployment() {
        let planner = CicdPlanner::new(config(json!({})));
        let plan = planner
            .create_plan(&params(json!({ "notifications": true })))
            .unwrap();
        assert_eq!(ids(&plan), vec!["lint", "test", "build", "notify"]);
        assert_eq!(plan.step("notify").unwrap().depends_on, vec!["build"]);
    }

    #[test]
    fn test_configuration_defaults_apply() {
        let planner = CicdPlanner::new(config(json!({
            "cicd": {
                "defaultPipelineType": "deployment",
                "defaultEnvironment": "qa",
                "deployStrategy": "blue-green",
                "linters": ["eslint", "stylelint"]
            }
        })));
        let plan = planner.create_plan(&Map::new()).unwrap();

        assert_eq!(ids(&plan), vec!["lint", "test", "build", "deploy", "verify"]);
        let deploy = plan.step("deploy").unwrap();
        assert_eq!(deploy.data["environment"], "qa");
        assert_eq!(deploy.data["strategy"], "blue-green");
        assert_eq!(
            plan.step("lint").unwrap().data["linters"],
            json!(["eslint", "stylelint"])
        );
    }

    #[test]
    fn test_every_variant_validates() {
        let planner = CicdPlanner::new(config(json!({})));
        for pipeline in ["standard", "deployment", "complete", "unknown"] {
            for notifications in [false, true] {
                let plan = planner
                    .create_plan(&params(json!({
                        "pipelineType": pipeline,
                        "notifications": notifications
                    })))
                    .unwrap();
                plan.validate().unwrap();
                assert!(plan.execution_order().is_ok());
            }
        }
    }
}
