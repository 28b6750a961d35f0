//! Documentation executor: analyze, extract, generate, validate and api-docs.
//!
//! Steps hand their results forward through the execution context. Extraction
//! reads the latest codebase analysis, generation reads the latest extraction
//! and validation reads the latest generation.

mod analyze;
mod api_docs;
mod extract;
mod generate;
mod source;
mod validate;

pub use analyze::{AnalyzedFile, DocAnalysisReport, DocAnalyzeConfig};
pub use api_docs::{ApiDocsConfig, ApiDocsReport, ApiFormat, ApiSource, Endpoint};
pub use extract::{DocExtractionReport, DocItem, DocReturn, ExtractConfig, ItemKind};
pub use generate::{safe_file_name, DocFormat, DocGenerationReport, GenerateConfig, GeneratedDoc};
pub use source::{estimate_coverage, scan, DocParam, DocTag, ElementKind, SourceElement};
pub use validate::{DocIssue, DocValidateConfig, DocValidationReport, IssueKind};

use async_trait::async_trait;
use std::str::FromStr;
use tracing::info;

use super::common::recover;
use super::{Executor, ExecutorDeps};
use crate::error::{common, EngineError};
use crate::plan::{Domain, ExecutionContext, ExecutionResult, PlanStep, ResultKind};

pub(crate) const SECTION: &str = "documentation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocStep {
    Analyze,
    Extract,
    Generate,
    Validate,
    ApiDocs,
}

impl DocStep {
    pub fn kind(&self) -> ResultKind {
        match self {
            DocStep::Analyze => ResultKind::AnalyzeCodebase,
            DocStep::Extract => ResultKind::ExtractDocumentation,
            DocStep::Generate => ResultKind::GenerateDocumentation,
            DocStep::Validate => ResultKind::ValidateDocumentation,
            DocStep::ApiDocs => ResultKind::GenerateApiDocs,
        }
    }
}

impl FromStr for DocStep {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "analyze" => Ok(DocStep::Analyze),
            "extract" => Ok(DocStep::Extract),
            "generate" => Ok(DocStep::Generate),
            "validate" => Ok(DocStep::Validate),
            "api-docs" => Ok(DocStep::ApiDocs),
            other => Err(common::unknown_step(SECTION, other)),
        }
    }
}

pub struct DocumentationExecutor {
    deps: ExecutorDeps,
}

impl DocumentationExecutor {
    pub fn new(deps: ExecutorDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Executor for DocumentationExecutor {
    fn domain(&self) -> Domain {
        Domain::Documentation
    }

    async fn execute_step(
        &self,
        step: &PlanStep,
        context: &ExecutionContext,
    ) -> Result<ExecutionResult, EngineError> {
        let kind: DocStep = step.id.parse()?;
        info!(step_id = %step.id, domain = SECTION, "Executing documentation step");

        let outcome = match kind {
            DocStep::Analyze => analyze::execute(&self.deps, step).await,
            DocStep::Extract => extract::execute(step, context),
            DocStep::Generate => generate::execute(&self.deps, step, context).await,
            DocStep::Validate => validate::execute(&self.deps, step, context).await,
            DocStep::ApiDocs => api_docs::execute(&self.deps, step, context).await,
        };
        Ok(recover(kind.kind(), &step.id, outcome))
    }
}
