use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

use super::SECTION;
use crate::error::Result;
use crate::executor::common::raw_output;
use crate::executor::ExecutorDeps;
use crate::plan::{ExecutionResult, PlanStep, ResultData, ResultKind};
use crate::subprocess::ProcessOutput;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LintConfig {
    pub linters: Vec<String>,
    pub fix: bool,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            linters: vec!["eslint".to_string()],
            fix: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinterOutcome {
    pub linter: String,
    pub exit_code: Option<i32>,
    pub errors: u64,
    pub warnings: u64,
    pub files_with_issues: u64,
    /// False when the output was not a JSON report and only the exit code counted
    pub parsed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintReport {
    pub linters: Vec<LinterOutcome>,
    pub errors: u64,
    pub warnings: u64,
    pub files_with_issues: u64,
    pub fixed: bool,
    pub report_path: Option<PathBuf>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileReport {
    #[serde(default)]
    error_count: u64,
    #[serde(default)]
    warning_count: u64,
}

/// Counts from an ESLint-style JSON report. Tools often print banners around
/// the array, so the outermost `[...]` is tried when the whole text fails.
fn parse_report(stdout: &str) -> Option<(u64, u64, u64)> {
    let files: Vec<FileReport> = serde_json::from_str(stdout.trim()).ok().or_else(|| {
        let start = stdout.find('[')?;
        let end = stdout.rfind(']')?;
        (start < end)
            .then(|| serde_json::from_str(&stdout[start..=end]).ok())
            .flatten()
    })?;

    Some(files.iter().fold((0, 0, 0), |(e, w, f), file| {
        let touched = file.error_count + file.warning_count > 0;
        (
            e + file.error_count,
            w + file.warning_count,
            f + u64::from(touched),
        )
    }))
}

fn outcome(linter: &str, output: &ProcessOutput) -> LinterOutcome {
    let exit_code = output.status.code();
    match parse_report(&output.stdout) {
        Some((errors, warnings, files_with_issues)) => LinterOutcome {
            linter: linter.to_string(),
            exit_code,
            errors,
            warnings,
            files_with_issues,
            parsed: true,
            raw_output: None,
        },
        None => LinterOutcome {
            linter: linter.to_string(),
            exit_code,
            // Without a report a non-zero exit stands in for one error
            errors: u64::from(!output.status.success()),
            parsed: false,
            raw_output: Some(raw_output(output)),
            ..Default::default()
        },
    }
}

pub(super) async fn execute(deps: &ExecutorDeps, step: &PlanStep) -> Result<ExecutionResult> {
    let config: LintConfig = step.data_as()?;
    let mut report = LintReport {
        fixed: config.fix,
        ..Default::default()
    };
    let mut all_clean = true;

    for linter in &config.linters {
        let mut builder = deps.configured_command(
            SECTION,
            &format!("lintCommands.{}", linter),
            &format!("npx {} . --format json", linter),
        )?;
        if config.fix {
            builder = builder.arg("--fix");
        }
        let output = deps.run(builder.build()).await?;
        let result = outcome(linter, &output);
        info!(
            linter = %linter,
            errors = result.errors,
            warnings = result.warnings,
            "Linter finished"
        );

        all_clean &= output.status.success() && result.errors == 0;
        report.errors += result.errors;
        report.warnings += result.warnings;
        report.files_with_issues += result.files_with_issues;
        report.linters.push(result);
    }

    match deps.write_report("lint-report.json", &report).await {
        Ok(path) => report.report_path = Some(path),
        Err(e) => warn!(error = %e, "Could not write lint report"),
    }

    let success = all_clean && report.errors == 0;
    let summary = format!(
        "Lint {}: {} error(s), {} warning(s) in {} file(s) across {} linter(s)",
        if success { "passed" } else { "failed" },
        report.errors,
        report.warnings,
        report.files_with_issues,
        report.linters.len()
    );
    let result = if success {
        ExecutionResult::succeeded(ResultKind::Lint, &step.id, summary)
    } else {
        ExecutionResult::failed(ResultKind::Lint, &step.id, summary)
    };
    Ok(result.with_data(ResultData::Lint(report)))
}
