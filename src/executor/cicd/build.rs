use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::SECTION;
use crate::error::Result;
use crate::executor::common::raw_output;
use crate::executor::ExecutorDeps;
use crate::plan::{ExecutionResult, PlanStep, ResultData, ResultKind};

const DEFAULT_ARTIFACT_DIRS: [&str; 4] = ["dist", "build", "out", "target"];
const DEFAULT_MAX_ARTIFACTS: usize = 500;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildConfig {
    pub production: bool,
    pub optimize: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            production: true,
            optimize: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub artifacts: Vec<Artifact>,
    pub production: bool,
    pub optimize: bool,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
}

/// Files under the artifact directories, sorted by path and capped at `limit`
pub(crate) fn scan_artifacts(root: &Path, dirs: &[String], limit: usize) -> Vec<Artifact> {
    let mut artifacts = Vec::new();
    for dir in dirs {
        let base = root.join(dir);
        if !base.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&base)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            if artifacts.len() >= limit {
                debug!(limit, "Artifact scan limit reached");
                return artifacts;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            artifacts.push(Artifact {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path().to_path_buf(),
                size,
            });
        }
    }
    artifacts
}

pub(super) async fn execute(deps: &ExecutorDeps, step: &PlanStep) -> Result<ExecutionResult> {
    let config: BuildConfig = step.data_as()?;

    let mut builder = deps.configured_command(SECTION, "buildCommand", "npm run build")?;
    if config.production {
        builder = builder.env("NODE_ENV", "production");
    }
    let output = deps.run(builder.build()).await?;

    let dirs: Vec<String> = deps
        .config_value(SECTION, "artifactDirs")
        .unwrap_or_else(|| DEFAULT_ARTIFACT_DIRS.iter().map(|d| d.to_string()).collect());
    let limit = deps
        .config_value(SECTION, "maxArtifacts")
        .unwrap_or(DEFAULT_MAX_ARTIFACTS);
    let working_dir = deps.settings.working_dir.clone();
    let artifacts = tokio::task::spawn_blocking(move || scan_artifacts(&working_dir, &dirs, limit))
        .await
        .unwrap_or_default();

    let success = output.status.success();
    info!(artifacts = artifacts.len(), success, "Build finished");
    let report = BuildReport {
        production: config.production,
        optimize: config.optimize,
        exit_code: output.status.code(),
        duration_ms: output.duration.as_millis() as u64,
        raw_output: (!success).then(|| raw_output(&output)),
        artifacts,
    };

    let result = if success {
        ExecutionResult::succeeded(
            ResultKind::Build,
            &step.id,
            format!(
                "Build succeeded with {} artifact(s){}",
                report.artifacts.len(),
                if config.production { " (production)" } else { "" }
            ),
        )
    } else {
        ExecutionResult::failed(
            ResultKind::Build,
            &step.id,
            format!("Build command failed with {}", output.status),
        )
    };
    Ok(result.with_data(ResultData::Build(report)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::cicd::test_support::deps;
    use crate::subprocess::MockProcessRunner;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_scan_respects_limit() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("dist/assets")).unwrap();
        std::fs::write(tmp.path().join("dist/index.html"), "<html/>").unwrap();
        std::fs::write(tmp.path().join("dist/assets/app.js"), "x").unwrap();
        std::fs::write(tmp.path().join("dist/assets/app.css"), "y").unwrap();

        let all = scan_artifacts(tmp.path(), &["dist".into(), "missing".into()], 10);
        assert_eq!(all.len(), 3);
        let capped = scan_artifacts(tmp.path(), &["dist".into()], 2);
        assert_eq!(capped.len(), 2);
    }

    #[tokio::test]
    async fn test_production_build_records_artifacts() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("out")).unwrap();
        std::fs::write(tmp.path().join("out/bundle.js"), "console.log(1)").unwrap();
        let mut runner = MockProcessRunner::new();
        runner.expect_command("npm").returns_exit_code(0).finish();
        let deps = deps(&runner, json!({}), tmp.path());

        let result = execute(&deps, &PlanStep::new("build", 3, "Build")).await.unwrap();
        assert!(result.success);
        let ResultData::Build(report) = result.data else {
            panic!("expected build payload");
        };
        assert_eq!(report.artifacts.len(), 1);
        assert_eq!(report.artifacts[0].name, "bundle.js");
        assert_eq!(report.artifacts[0].size, 14);

        let call = &runner.get_call_history()[0];
        assert_eq!(call.env.get("NODE_ENV").map(String::as_str), Some("production"));
    }

    #[tokio::test]
    async fn test_failed_build_keeps_output() {
        let tmp = TempDir::new().unwrap();
        let mut runner = MockProcessRunner::new();
        runner
            .expect_command("npm")
            .returns_stderr("error TS2304: Cannot find name 'foo'")
            .returns_exit_code(2)
            .finish();
        let deps = deps(&runner, json!({}), tmp.path());

        let step = PlanStep::new("build", 3, "Build").with_data(json!({ "production": false }));
        let result = execute(&deps, &step).await.unwrap();
        assert!(!result.success);
        let ResultData::Build(report) = result.data else {
            panic!("expected build payload");
        };
        assert!(report.raw_output.unwrap().contains("TS2304"));
        assert!(runner.get_call_history()[0].env.is_empty());
    }
}
