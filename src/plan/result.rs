//! Step outcomes produced by executors
//!
//! An [`ExecutionResult`] is the uniform envelope every handler returns. The
//! handler-specific payload lives in [`ResultData`], one variant per handler,
//! so downstream steps read typed fields instead of probing JSON.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::executor::cicd::{
    BuildReport, DeployReport, LintReport, NotifyReport, TestReport, VerifyReport,
};
use crate::executor::data::{
    AnalyzeReport, CollectReport, StoreReport, TransformReport, ValidateReport, VisualizeReport,
};
use crate::executor::documentation::{
    ApiDocsReport, DocAnalysisReport, DocExtractionReport, DocGenerationReport,
    DocValidationReport,
};
use crate::executor::general::ManualReport;
use crate::planning::{ContextReport, UiReport};

/// What kind of work produced a result. Mirrors or refines the step's action type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultKind {
    Lint,
    Test,
    Build,
    Deploy,
    Verify,
    Notify,
    Collect,
    Validate,
    Transform,
    Analyze,
    Visualize,
    Store,
    AnalyzeCodebase,
    ExtractDocumentation,
    GenerateDocumentation,
    ValidateDocumentation,
    GenerateApiDocs,
    Context,
    Ui,
    Manual,
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResultKind::Lint => "lint",
            ResultKind::Test => "test",
            ResultKind::Build => "build",
            ResultKind::Deploy => "deploy",
            ResultKind::Verify => "verify",
            ResultKind::Notify => "notify",
            ResultKind::Collect => "collect",
            ResultKind::Validate => "validate",
            ResultKind::Transform => "transform",
            ResultKind::Analyze => "analyze",
            ResultKind::Visualize => "visualize",
            ResultKind::Store => "store",
            ResultKind::AnalyzeCodebase => "analyze-codebase",
            ResultKind::ExtractDocumentation => "extract-documentation",
            ResultKind::GenerateDocumentation => "generate-documentation",
            ResultKind::ValidateDocumentation => "validate-documentation",
            ResultKind::GenerateApiDocs => "generate-api-docs",
            ResultKind::Context => "context",
            ResultKind::Ui => "ui",
            ResultKind::Manual => "manual",
        };
        f.write_str(s)
    }
}

/// Handler-specific payload of a result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "camelCase")]
pub enum ResultData {
    #[default]
    None,
    Lint(LintReport),
    Test(TestReport),
    Build(BuildReport),
    Deploy(DeployReport),
    Verify(VerifyReport),
    Notify(NotifyReport),
    Collect(CollectReport),
    Validate(ValidateReport),
    Transform(TransformReport),
    Analyze(AnalyzeReport),
    Visualize(VisualizeReport),
    Store(StoreReport),
    DocAnalysis(DocAnalysisReport),
    DocExtraction(DocExtractionReport),
    DocGeneration(DocGenerationReport),
    DocValidation(DocValidationReport),
    ApiDocs(ApiDocsReport),
    Context(ContextReport),
    Ui(UiReport),
    Manual(ManualReport),
}

impl ResultData {
    pub fn is_none(&self) -> bool {
        matches!(self, ResultData::None)
    }
}

/// Outcome of one step. `error` is present exactly when `success` is false.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    #[serde(rename = "type")]
    pub kind: ResultKind,
    pub success: bool,
    pub step_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "ResultData::is_none")]
    pub data: ResultData,
}

impl ExecutionResult {
    pub fn succeeded(kind: ResultKind, step_id: &str, summary: impl Into<String>) -> Self {
        let summary = summary.into();
        Self {
            kind,
            success: true,
            step_id: step_id.to_string(),
            message: summary.clone(),
            summary,
            error: None,
            data: ResultData::None,
        }
    }

    pub fn failed(kind: ResultKind, step_id: &str, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            kind,
            success: false,
            step_id: step_id.to_string(),
            message: error.clone(),
            summary: format!("Error in step {}: {}", step_id, error),
            error: Some(error),
            data: ResultData::None,
        }
    }

    /// Pick `succeeded` or `failed` from a computed outcome. `detail` is the
    /// summary on success and the error text on failure.
    pub fn from_outcome(kind: ResultKind, step_id: &str, success: bool, detail: String) -> Self {
        if success {
            Self::succeeded(kind, step_id, detail)
        } else {
            Self::failed(kind, step_id, detail)
        }
    }

    pub fn with_data(mut self, data: ResultData) -> Self {
        self.data = data;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_result_carries_error_and_summary() {
        let result = ExecutionResult::failed(ResultKind::Deploy, "deploy", "No build artifacts");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("No build artifacts"));
        assert_eq!(result.summary, "Error in step deploy: No build artifacts");
    }

    #[test]
    fn test_succeeded_result_has_no_error() {
        let result = ExecutionResult::succeeded(ResultKind::Lint, "lint", "0 errors")
            .with_message("Linting passed");
        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(result.message, "Linting passed");
    }

    #[test]
    fn test_serialized_shape() {
        let result = ExecutionResult::failed(ResultKind::GenerateApiDocs, "api-docs", "no spec");
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["type"], "generate-api-docs");
        assert_eq!(value["stepId"], "api-docs");
        assert_eq!(value["error"], "no spec");
        assert!(value.get("data").is_none());

        let ok = ExecutionResult::succeeded(ResultKind::Manual, "step-1", "done");
        let value = serde_json::to_value(&ok).unwrap();
        assert!(value.get("error").is_none());
    }
}
