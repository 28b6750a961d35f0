use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

use super::{ParamResolver, Planner, StepData};
use crate::config::ConfigProvider;
use crate::error::Result;
use crate::plan::{ActionType, Domain, Plan, PlanStep};

/// Plans `collect -> validate -> transform [-> analyze -> visualize] -> store`
pub struct DataPlanner {
    config: Arc<dyn ConfigProvider>,
}

impl DataPlanner {
    pub fn new(config: Arc<dyn ConfigProvider>) -> Self {
        Self { config }
    }

    fn default_steps(r: &ParamResolver<'_>) -> Vec<PlanStep> {
        vec![
            PlanStep::new("collect", 1, "Collect data")
                .with_description("Gather data from specified sources")
                .with_action(ActionType::Extract)
                .with_data(
                    StepData::new()
                        .set("sources", r.value("sources", "defaultSources", json!(["./data/raw"])))
                        .set("formats", r.value("formats", "formats", json!(["json", "csv"])))
                        .set_opt(
                            "maxRecordsInContext",
                            r.optional("maxRecordsInContext", "maxRecordsInContext"),
                        )
                        .build(),
                ),
            PlanStep::new("validate", 2, "Validate data")
                .with_description("Ensure data quality and integrity")
                .with_action(ActionType::CodeAnalysis)
                .depends_on(["collect"])
                .with_data(
                    StepData::new()
                        .set("validateSchema", r.flag("validateSchema", "validateSchema", true))
                        .set(
                            "checkCompleteness",
                            r.flag("checkCompleteness", "checkCompleteness", true),
                        )
                        .set(
                            "checkConsistency",
                            r.flag("checkConsistency", "checkConsistency", true),
                        )
                        .set_opt(
                            "checkCompletenessFields",
                            r.optional("checkCompletenessFields", "checkCompletenessFields"),
                        )
                        .set_opt("rules", r.optional("rules", "consistencyRules"))
                        .set_opt("schema", r.optional("schema", "schema"))
                        .set_opt("mode", r.optional("validationMode", "validationMode"))
                        .set_opt("maxInvalidRate", r.optional("maxInvalidRate", "maxInvalidRate"))
                        .build(),
                ),
            PlanStep::new("transform", 3, "Transform data")
                .with_description("Process and transform the data")
                .with_action(ActionType::Transform)
                .depends_on(["validate"])
                .with_data(
                    StepData::new()
                        .set(
                            "transformations",
                            r.value(
                                "transformations",
                                "defaultTransformations",
                                json!(["normalize"]),
                            ),
                        )
                        .set("inPlace", r.flag("inPlace", "inPlace", false))
                        .build(),
                ),
        ]
    }

    fn analysis_steps(r: &ParamResolver<'_>, first_number: u32) -> Vec<PlanStep> {
        vec![
            PlanStep::new("analyze", first_number, "Analyze data")
                .with_description("Perform data analysis")
                .with_action(ActionType::CodeAnalysis)
                .depends_on(["transform"])
                .with_data(
                    StepData::new()
                        .set(
                            "analysisTypes",
                            r.value(
                                "analysisTypes",
                                "analysisTypes",
                                json!(["statistical", "exploratory"]),
                            ),
                        )
                        .set(
                            "generateReports",
                            r.flag("generateReports", "generateReports", true),
                        )
                        .build(),
                ),
            PlanStep::new("visualize", first_number + 1, "Visualize results")
                .with_description("Create visualizations of analysis results")
                .with_action(ActionType::Manual)
                .depends_on(["analyze"])
                .with_data(
                    StepData::new()
                        .set(
                            "visualizationTypes",
                            r.value(
                                "visualizationTypes",
                                "visualizationTypes",
                                json!(["bar_chart", "summary_table"]),
                            ),
                        )
                        .set("interactive", r.flag("interactive", "interactive", false))
                        .build(),
                ),
        ]
    }

    fn store_step(r: &ParamResolver<'_>, number: u32, after: &str) -> PlanStep {
        PlanStep::new("store", number, "Store processed data")
            .with_description("Save the processed data to the target location")
            .with_action(ActionType::Load)
            .depends_on([after])
            .with_data(
                StepData::new()
                    .set(
                        "destination",
                        r.string("destination", "defaultDestination", "./data/processed"),
                    )
                    .set("format", r.string("outputFormat", "outputFormat", "json"))
                    .set("compression", r.string("compression", "compression", "none"))
                    .build(),
            )
    }
}

impl Planner for DataPlanner {
    fn domain(&self) -> Domain {
        Domain::Data
    }

    fn create_plan(&self, params: &Map<String, Value>) -> Result<Plan> {
        let r = ParamResolver::new(params, self.config.get_config("data"));
        let workflow_type = r.string("workflowType", "defaultWorkflowType", "processing");
        debug!(workflow_type = %workflow_type, "Creating data processing plan");

        let mut steps = Self::default_steps(&r);
        let analyzes = matches!(workflow_type.as_str(), "analysis" | "complete");
        if analyzes {
            steps.extend(Self::analysis_steps(&r, steps.len() as u32 + 1));
        }
        let after = if analyzes { "visualize" } else { "transform" };
        steps.push(Self::store_step(&r, steps.len() as u32 + 1, after));

        let plan = Plan::new(
            Domain::Data,
            r.param_string("name")
                .unwrap_or_else(|| format!("Data {} Plan", workflow_type)),
            r.param_string("description")
                .unwrap_or_else(|| format!("Plan for {} data workflow", workflow_type)),
        )
        .with_steps(steps)
        .with_metadata("workflowType", Value::String(workflow_type));

        plan.validate()?;
        Ok(plan)
    }
}
