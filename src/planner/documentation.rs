use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

use super::{ParamResolver, Planner, StepData};
use crate::config::ConfigProvider;
use crate::error::Result;
use crate::plan::{ActionType, Domain, Plan, PlanStep};

/// Plans `analyze -> extract -> generate -> validate`, plus `api-docs`
/// after `extract` when API docs are requested
pub struct DocumentationPlanner {
    config: Arc<dyn ConfigProvider>,
}

impl DocumentationPlanner {
    pub fn new(config: Arc<dyn ConfigProvider>) -> Self {
        Self { config }
    }

    fn default_steps(r: &ParamResolver<'_>) -> Vec<PlanStep> {
        vec![
            PlanStep::new("analyze", 1, "Analyze codebase structure")
                .with_description("Scan codebase to identify components requiring documentation")
                .with_action(ActionType::CodeAnalysis)
                .with_data(
                    StepData::new()
                        .set(
                            "patterns",
                            r.value("patterns", "defaultPatterns", json!(["**/*.ts", "**/*.js"])),
                        )
                        .set(
                            "excludePatterns",
                            r.value(
                                "excludePatterns",
                                "excludePatterns",
                                json!(["**/node_modules/**"]),
                            ),
                        )
                        .set_opt("basePath", r.optional("basePath", "basePath"))
                        .set_opt("coverageTarget", r.optional("coverageTarget", "coverageTarget"))
                        .build(),
                ),
            PlanStep::new("extract", 2, "Extract documentation from code")
                .with_description("Parse doc comments and declared symbols")
                .with_action(ActionType::Extract)
                .depends_on(["analyze"])
                .with_data(
                    StepData::new()
                        .set("extractComments", true)
                        .set("extractTypes", true)
                        .set(
                            "extractExamples",
                            r.flag("extractExamples", "extractExamples", true),
                        )
                        .set(
                            "forceExtractAll",
                            r.flag("forceExtractAll", "forceExtractAll", false),
                        )
                        .build(),
                ),
            PlanStep::new("generate", 3, "Generate documentation")
                .with_description("Create documentation files based on extracted information")
                .with_action(ActionType::Documentation)
                .depends_on(["extract"])
                .with_data(
                    StepData::new()
                        .set("format", r.string("format", "defaultFormat", "markdown"))
                        .set("outputDir", r.string("outputDir", "outputDir", "./docs"))
                        .set_opt("templates", r.optional("templates", "templates"))
                        .build(),
                ),
            PlanStep::new("validate", 4, "Validate documentation")
                .with_description("Check for completeness and correctness of generated docs")
                .with_action(ActionType::Test)
                .depends_on(["generate"])
                .with_data(
                    StepData::new()
                        .set("validateLinks", r.flag("validateLinks", "validateLinks", true))
                        .set(
                            "validateExamples",
                            r.flag("validateExamples", "validateExamples", true),
                        )
                        .set(
                            "validateCoverage",
                            r.flag("validateCoverage", "validateCoverage", true),
                        )
                        .set_opt(
                            "coverageThreshold",
                            r.optional("coverageThreshold", "coverageThreshold"),
                        )
                        .build(),
                ),
        ]
    }

    fn api_docs_step(r: &ParamResolver<'_>, number: u32) -> PlanStep {
        PlanStep::new("api-docs", number, "Generate API documentation")
            .with_description("Create API reference documentation")
            .with_action(ActionType::Documentation)
            .depends_on(["extract"])
            .with_data(
                StepData::new()
                    .set("format", r.string("apiFormat", "apiFormat", "html"))
                    .set("outputDir", r.string("apiOutputDir", "apiOutputDir", "./docs/api"))
                    .set_opt("specFile", r.optional("apiSpecFile", "apiSpecFile"))
                    .build(),
            )
    }
}

impl Planner for DocumentationPlanner {
    fn domain(&self) -> Domain {
        Domain::Documentation
    }

    fn create_plan(&self, params: &Map<String, Value>) -> Result<Plan> {
        let r = ParamResolver::new(params, self.config.get_config("documentation"));
        let include_api = r.flag("includeApi", "includeApi", false);
        debug!(include_api, "Creating documentation plan");

        let mut steps = Self::default_steps(&r);
        if include_api {
            steps.push(Self::api_docs_step(&r, steps.len() as u32 + 1));
        }

        let plan = Plan::new(
            Domain::Documentation,
            r.param_string("name")
                .unwrap_or_else(|| "Documentation Generation Plan".to_string()),
            r.param_string("description")
                .unwrap_or_else(|| "Plan for generating project documentation".to_string()),
        )
        .with_steps(steps)
        .with_metadata("includeApi", Value::Bool(include_api));

        plan.validate()?;
        Ok(plan)
    }
}
