use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::generate::GeneratedDoc;
use crate::error::Result;
use crate::executor::ExecutorDeps;
use crate::plan::{ExecutionContext, ExecutionResult, PlanStep, ResultData, ResultKind};

static MARKDOWN_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]+\]\(([^)\s]+)\)").expect("Valid regex pattern"));
static HTML_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"href="([^"]+)""#).expect("Valid regex pattern"));

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocValidateConfig {
    #[serde(alias = "checkBrokenLinks")]
    pub validate_links: bool,
    #[serde(alias = "checkCoverage")]
    pub validate_coverage: bool,
    /// Reject documents with an unterminated code fence
    pub validate_examples: bool,
    /// Percent of analyzed files that must have generated documentation
    pub coverage_threshold: f64,
    #[serde(alias = "externalLinkTimeout")]
    pub external_link_timeout_ms: u64,
}

impl Default for DocValidateConfig {
    fn default() -> Self {
        Self {
            validate_links: true,
            validate_coverage: true,
            validate_examples: true,
            coverage_threshold: 80.0,
            external_link_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    BrokenExternalLink,
    BrokenLocalLink,
    UnterminatedCodeBlock,
    CoverageGap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocIssue {
    pub kind: IssueKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocValidationReport {
    pub files_checked: usize,
    pub broken_links: usize,
    pub coverage_gaps: usize,
    /// Absent when coverage checking is off
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_percent: Option<f64>,
    pub issues: Vec<DocIssue>,
}

pub(crate) fn links(content: &str) -> Vec<String> {
    MARKDOWN_LINK
        .captures_iter(content)
        .chain(HTML_LINK.captures_iter(content))
        .map(|c| c[1].to_string())
        .collect()
}

/// Local link target, checked next to the document and then under the output root
fn local_target_exists(link: &str, doc: &Path, output_dir: &Path) -> bool {
    let target = link.split('#').next().unwrap_or(link);
    if target.is_empty() {
        return true;
    }
    let near = doc.parent().map(|d| d.join(target));
    let root = output_dir.join(target.trim_start_matches("./"));
    near.is_some_and(|p| p.exists()) || root.exists()
}

struct LinkChecker<'a> {
    deps: &'a ExecutorDeps,
    timeout: Duration,
    output_dir: &'a Path,
}

impl LinkChecker<'_> {
    async fn check(&self, doc: &Path, link: &str) -> Option<DocIssue> {
        if link.starts_with("http://") || link.starts_with("https://") {
            let response = self.deps.http.head(link).timeout(self.timeout).send().await;
            let problem = match response {
                Err(e) if e.is_timeout() => Some("request timed out".to_string()),
                Err(e) => Some(format!("request failed: {}", e)),
                Ok(response) if !response.status().is_success() => {
                    Some(format!("returned status {}", response.status().as_u16()))
                }
                Ok(_) => None,
            };
            return problem.map(|p| DocIssue {
                kind: IssueKind::BrokenExternalLink,
                file: Some(doc.to_path_buf()),
                link: Some(link.to_string()),
                message: format!("External link {}", p),
            });
        }
        if link.starts_with('#') || link.starts_with("mailto:") {
            return None;
        }
        (!local_target_exists(link, doc, self.output_dir)).then(|| DocIssue {
            kind: IssueKind::BrokenLocalLink,
            file: Some(doc.to_path_buf()),
            link: Some(link.to_string()),
            message: "Local link target not found".to_string(),
        })
    }
}

pub(super) async fn execute(
    deps: &ExecutorDeps,
    step: &PlanStep,
    context: &ExecutionContext,
) -> Result<ExecutionResult> {
    let config: DocValidateConfig = step.data_as()?;
    let generation = match context.latest_generation() {
        Some((result, report)) if result.success && report.written().next().is_some() => report,
        _ => {
            return Ok(ExecutionResult::failed(
                ResultKind::ValidateDocumentation,
                &step.id,
                "No generated documentation available for validation",
            ))
        }
    };

    let checker = LinkChecker {
        deps,
        timeout: Duration::from_millis(config.external_link_timeout_ms),
        output_dir: &generation.output_dir,
    };
    let mut report = DocValidationReport::default();
    let written: Vec<&GeneratedDoc> = generation.written().collect();

    for doc in &written {
        let content = match tokio::fs::read_to_string(&doc.output_path).await {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %doc.output_path.display(), error = %e, "Could not read generated file");
                continue;
            }
        };
        report.files_checked += 1;

        if config.validate_links {
            for link in links(&content) {
                debug!(link = %link, file = %doc.output_path.display(), "Checking link");
                if let Some(issue) = checker.check(&doc.output_path, &link).await {
                    warn!(link = %link, message = %issue.message, "Broken link");
                    report.broken_links += 1;
                    report.issues.push(issue);
                }
            }
        }
        if config.validate_examples && content.matches("```").count() % 2 == 1 {
            report.issues.push(DocIssue {
                kind: IssueKind::UnterminatedCodeBlock,
                file: Some(doc.output_path.clone()),
                link: None,
                message: "Document has an unterminated code block".to_string(),
            });
        }
    }

    let mut coverage_ok = true;
    if config.validate_coverage {
        let analyzed = context
            .latest_doc_analysis()
            .map_or(0, |(_, analysis)| analysis.files.len());
        let documented: BTreeSet<&str> = written.iter().map(|d| d.source_file.as_str()).collect();
        let percent = if analyzed > 0 {
            (documented.len() as f64 / analyzed as f64 * 100.0).min(100.0)
        } else {
            0.0
        };
        let percent = (percent * 10.0).round() / 10.0;
        report.coverage_percent = Some(percent);
        if percent < config.coverage_threshold {
            coverage_ok = false;
            report.coverage_gaps = analyzed.saturating_sub(documented.len());
            report.issues.push(DocIssue {
                kind: IssueKind::CoverageGap,
                file: None,
                link: None,
                message: format!(
                    "Overall coverage {:.1}% is below the {}% threshold; about {} source file(s) lack documentation",
                    percent, config.coverage_threshold, report.coverage_gaps
                ),
            });
        }
    }

    let unterminated = report
        .issues
        .iter()
        .any(|i| i.kind == IssueKind::UnterminatedCodeBlock);
    let success = report.broken_links == 0 && coverage_ok && !unterminated;

    let mut summary = format!(
        "Documentation validation checked {} file(s); {} broken link(s)",
        report.files_checked, report.broken_links
    );
    if let Some(percent) = report.coverage_percent {
        summary.push_str(&format!("; coverage {:.1}%", percent));
        if !coverage_ok {
            summary.push_str(&format!(" (below the {}% threshold)", config.coverage_threshold));
        }
    }
    if unterminated {
        summary.push_str("; unterminated code block found");
    }
    info!(
        files = report.files_checked,
        broken_links = report.broken_links,
        coverage = ?report.coverage_percent,
        success,
        "Documentation validation finished"
    );

    let result = ExecutionResult::from_outcome(
        ResultKind::ValidateDocumentation,
        &step.id,
        success,
        if success {
            summary
        } else {
            format!("Validation found issues: {}", summary)
        },
    );
    Ok(result.with_data(ResultData::DocValidation(report)))
}
