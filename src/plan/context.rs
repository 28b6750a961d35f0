use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::result::{ExecutionResult, ResultData, ResultKind};
use crate::error::{EngineError, ErrorCode, Result};
use crate::executor::cicd::{BuildReport, DeployReport};
use crate::executor::data::{
    AnalyzeReport, CollectReport, TransformReport, ValidateReport, VisualizeReport,
};
use crate::executor::documentation::{DocAnalysisReport, DocExtractionReport, DocGenerationReport};

/// Results recorded so far in a run, keyed by step id in insertion order.
///
/// The store only grows; a step id can be recorded once.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionContext {
    results: Vec<ExecutionResult>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: ExecutionResult) -> Result<()> {
        if self.index.contains_key(&result.step_id) {
            return Err(EngineError::workflow_with_code(
                ErrorCode::WORKFLOW_DUPLICATE_RESULT,
                format!("A result for step '{}' was already recorded", result.step_id),
            )
            .with_step(result.step_id.clone()));
        }
        self.index.insert(result.step_id.clone(), self.results.len());
        self.results.push(result);
        Ok(())
    }

    pub fn get(&self, step_id: &str) -> Option<&ExecutionResult> {
        self.index.get(step_id).map(|&i| &self.results[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Most recently recorded result of a kind
    pub fn latest_of(&self, kind: ResultKind) -> Option<&ExecutionResult> {
        self.results.iter().rev().find(|r| r.kind == kind)
    }

    fn latest_with<'a, T>(
        &'a self,
        kind: ResultKind,
        pick: impl Fn(&'a ResultData) -> Option<&'a T>,
    ) -> Option<(&'a ExecutionResult, &'a T)> {
        let result = self.latest_of(kind)?;
        pick(&result.data).map(|data| (result, data))
    }

    pub fn latest_build(&self) -> Option<(&ExecutionResult, &BuildReport)> {
        self.latest_with(ResultKind::Build, |d| match d {
            ResultData::Build(r) => Some(r),
            _ => None,
        })
    }

    pub fn latest_deploy(&self) -> Option<(&ExecutionResult, &DeployReport)> {
        self.latest_with(ResultKind::Deploy, |d| match d {
            ResultData::Deploy(r) => Some(r),
            _ => None,
        })
    }

    pub fn latest_collect(&self) -> Option<(&ExecutionResult, &CollectReport)> {
        self.latest_with(ResultKind::Collect, |d| match d {
            ResultData::Collect(r) => Some(r),
            _ => None,
        })
    }

    pub fn latest_validation(&self) -> Option<(&ExecutionResult, &ValidateReport)> {
        self.latest_with(ResultKind::Validate, |d| match d {
            ResultData::Validate(r) => Some(r),
            _ => None,
        })
    }

    pub fn latest_transform(&self) -> Option<(&ExecutionResult, &TransformReport)> {
        self.latest_with(ResultKind::Transform, |d| match d {
            ResultData::Transform(r) => Some(r),
            _ => None,
        })
    }

    pub fn latest_analysis(&self) -> Option<(&ExecutionResult, &AnalyzeReport)> {
        self.latest_with(ResultKind::Analyze, |d| match d {
            ResultData::Analyze(r) => Some(r),
            _ => None,
        })
    }

    pub fn latest_visualization(&self) -> Option<(&ExecutionResult, &VisualizeReport)> {
        self.latest_with(ResultKind::Visualize, |d| match d {
            ResultData::Visualize(r) => Some(r),
            _ => None,
        })
    }

    pub fn latest_doc_analysis(&self) -> Option<(&ExecutionResult, &DocAnalysisReport)> {
        self.latest_with(ResultKind::AnalyzeCodebase, |d| match d {
            ResultData::DocAnalysis(r) => Some(r),
            _ => None,
        })
    }

    pub fn latest_extraction(&self) -> Option<(&ExecutionResult, &DocExtractionReport)> {
        self.latest_with(ResultKind::ExtractDocumentation, |d| match d {
            ResultData::DocExtraction(r) => Some(r),
            _ => None,
        })
    }

    pub fn latest_generation(&self) -> Option<(&ExecutionResult, &DocGenerationReport)> {
        self.latest_with(ResultKind::GenerateDocumentation, |d| match d {
            ResultData::DocGeneration(r) => Some(r),
            _ => None,
        })
    }

    /// The most processed record set available: transformed, else validated,
    /// else collected. Only successful steps count.
    pub fn latest_records(&self) -> Option<&[Value]> {
        if let Some((result, report)) = self.latest_transform() {
            if result.success {
                return Some(&report.records);
            }
        }
        if let Some((result, report)) = self.latest_validation() {
            if result.success {
                return Some(&report.valid_records);
            }
        }
        match self.latest_collect() {
            Some((result, report)) if result.success => Some(&report.records),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for ExecutionContext {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            results: Vec<ExecutionResult>,
        }
        let raw = Raw::deserialize(deserializer)?;
        let mut context = ExecutionContext::new();
        for result in raw.results {
            context.record(result).map_err(serde::de::Error::custom)?;
        }
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::cicd::Artifact;

    fn build(step_id: &str, artifacts: usize) -> ExecutionResult {
        let report = BuildReport {
            artifacts: (0..artifacts)
                .map(|i| Artifact {
                    name: format!("bundle-{}.js", i),
                    path: format!("dist/bundle-{}.js", i).into(),
                    size: 10,
                })
                .collect(),
            ..Default::default()
        };
        ExecutionResult::succeeded(ResultKind::Build, step_id, "built").with_data(ResultData::Build(report))
    }

    #[test]
    fn test_record_rejects_duplicates() {
        let mut ctx = ExecutionContext::new();
        ctx.record(ExecutionResult::succeeded(ResultKind::Lint, "lint", "ok"))
            .unwrap();
        let err = ctx
            .record(ExecutionResult::failed(ResultKind::Lint, "lint", "again"))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::WORKFLOW_DUPLICATE_RESULT);
        assert!(ctx.get("lint").unwrap().success);
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_latest_build_returns_most_recent() {
        let mut ctx = ExecutionContext::new();
        ctx.record(build("build-1", 1)).unwrap();
        ctx.record(build("build-2", 3)).unwrap();

        let (result, report) = ctx.latest_build().unwrap();
        assert_eq!(result.step_id, "build-2");
        assert_eq!(report.artifacts.len(), 3);
        assert!(ctx.latest_deploy().is_none());
    }

    #[test]
    fn test_latest_records_prefers_transformed() {
        let mut ctx = ExecutionContext::new();
        let collected = CollectReport {
            records: vec![serde_json::json!({ "a": 1 }), serde_json::json!({ "a": 2 })],
            total_records: 2,
            ..Default::default()
        };
        ctx.record(
            ExecutionResult::succeeded(ResultKind::Collect, "collect", "2 records")
                .with_data(ResultData::Collect(collected)),
        )
        .unwrap();
        assert_eq!(ctx.latest_records().unwrap().len(), 2);

        let transformed = TransformReport {
            records: vec![serde_json::json!({ "a": 2 })],
            ..Default::default()
        };
        ctx.record(
            ExecutionResult::succeeded(ResultKind::Transform, "transform", "1 record")
                .with_data(ResultData::Transform(transformed)),
        )
        .unwrap();
        assert_eq!(ctx.latest_records().unwrap().len(), 1);
    }

    #[test]
    fn test_deserialize_rebuilds_index() {
        let mut ctx = ExecutionContext::new();
        ctx.record(ExecutionResult::succeeded(ResultKind::Manual, "step-1", "ok"))
            .unwrap();
        let json = serde_json::to_string(&ctx).unwrap();
        let back: ExecutionContext = serde_json::from_str(&json).unwrap();
        assert!(back.get("step-1").is_some());
    }
}
