use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::SECTION;
use crate::error::{EngineError, ErrorCode, Result};
use crate::executor::common::{fill_placeholders, raw_output};
use crate::executor::ExecutorDeps;
use crate::plan::{ExecutionContext, ExecutionResult, PlanStep, ResultData, ResultKind};
use crate::subprocess::ProcessCommandBuilder;

const DEFAULT_DEPLOY_COMMAND: &str = "npm run deploy -- --env {environment}";
const DEFAULT_URL_PATTERN: &str = r#"https?://[^\s"'<>]+"#;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeployConfig {
    pub environment: String,
    #[serde(alias = "deploymentStrategy")]
    pub strategy: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            environment: "staging".to_string(),
            strategy: "rolling".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployReport {
    pub environment: String,
    pub strategy: String,
    /// Deployment URL found in the command output
    pub url: Option<String>,
    pub exit_code: Option<i32>,
    pub artifact_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
}

fn url_pattern(deps: &ExecutorDeps) -> Result<Regex> {
    let pattern: String = deps
        .config_value(SECTION, "deployUrlPattern")
        .unwrap_or_else(|| DEFAULT_URL_PATTERN.to_string());
    Regex::new(&pattern).map_err(|e| {
        EngineError::config_with_code(
            ErrorCode::CONFIG_INVALID_VALUE,
            format!("Invalid cicd.deployUrlPattern '{}'", pattern),
        )
        .with_source(e)
    })
}

pub(super) async fn execute(
    deps: &ExecutorDeps,
    step: &PlanStep,
    context: &ExecutionContext,
) -> Result<ExecutionResult> {
    let config: DeployConfig = step.data_as()?;

    let artifact_count = match context.latest_build() {
        Some((result, build)) if result.success => build.artifacts.len(),
        Some(_) => {
            return Ok(ExecutionResult::failed(
                ResultKind::Deploy,
                &step.id,
                "Cannot deploy: the latest build failed and produced no usable artifacts",
            ))
        }
        None => {
            return Ok(ExecutionResult::failed(
                ResultKind::Deploy,
                &step.id,
                "Cannot deploy: no build artifacts found (run the build step first)",
            ))
        }
    };
    if artifact_count == 0 {
        return Ok(ExecutionResult::failed(
            ResultKind::Deploy,
            &step.id,
            "Cannot deploy: the build produced no artifacts",
        ));
    }

    let pattern = url_pattern(deps)?;
    let placeholders = [
        ("environment", config.environment.as_str()),
        ("strategy", config.strategy.as_str()),
    ];
    let template = deps.configured_command(SECTION, "deployCommand", DEFAULT_DEPLOY_COMMAND)?.build();
    let command = ProcessCommandBuilder::new(&fill_placeholders(&template.program, &placeholders))
        .args(template.args.iter().map(|a| fill_placeholders(a, &placeholders)))
        .env("DEPLOY_ENV", &config.environment)
        .env("DEPLOY_STRATEGY", &config.strategy)
        .build();

    info!(
        environment = %config.environment,
        strategy = %config.strategy,
        artifacts = artifact_count,
        "Deploying"
    );
    let output = deps.run(command).await?;
    let combined = output.combined_output();
    let url = pattern.find(&combined).map(|m| m.as_str().to_string());
    let success = output.status.success();
    if success && url.is_none() {
        warn!("Deployment finished without a recognizable URL in its output");
    }

    let report = DeployReport {
        environment: config.environment.clone(),
        strategy: config.strategy.clone(),
        url,
        exit_code: output.status.code(),
        artifact_count,
        raw_output: (!success).then(|| raw_output(&output)),
    };
    let result = if success {
        let target = report
            .url
            .as_deref()
            .map(|u| format!(" at {}", u))
            .unwrap_or_default();
        ExecutionResult::succeeded(
            ResultKind::Deploy,
            &step.id,
            format!(
                "Deployed {} artifact(s) to {}{} using {} strategy",
                artifact_count, config.environment, target, config.strategy
            ),
        )
    } else {
        ExecutionResult::failed(
            ResultKind::Deploy,
            &step.id,
            format!(
                "Deployment to {} failed with {}",
                config.environment, output.status
            ),
        )
    };
    Ok(result.with_data(ResultData::Deploy(report)))
}
