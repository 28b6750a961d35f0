use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::source::{estimate_coverage, scan, SourceElement};
use crate::error::{EngineError, ErrorCode, Result};
use crate::executor::ExecutorDeps;
use crate::plan::{ExecutionResult, PlanStep, ResultData, ResultKind};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocAnalyzeConfig {
    /// Globs relative to `basePath`; a leading `!` turns one into an exclusion
    pub patterns: Vec<String>,
    #[serde(alias = "ignorePatterns")]
    pub exclude_patterns: Vec<String>,
    pub base_path: String,
    pub coverage_target: f64,
}

impl Default for DocAnalyzeConfig {
    fn default() -> Self {
        Self {
            patterns: vec!["**/*.ts".to_string(), "**/*.js".to_string()],
            exclude_patterns: vec!["**/node_modules/**".to_string(), "**/.git/**".to_string()],
            base_path: ".".to_string(),
            coverage_target: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedFile {
    /// Relative to the analysis base path, `/`-separated
    pub path: String,
    pub file_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    pub needs_documentation: bool,
    pub coverage: f64,
    pub elements: Vec<SourceElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocAnalysisReport {
    pub files: Vec<AnalyzedFile>,
    pub patterns: Vec<String>,
    pub base_path: PathBuf,
    pub files_needing_docs: usize,
}

fn file_type(path: &str) -> &'static str {
    match Path::new(path).extension().and_then(|e| e.to_str()) {
        Some("ts" | "js" | "mjs" | "cjs") => "module",
        Some("tsx" | "jsx") => "component",
        _ => "unknown",
    }
}

fn compile(patterns: &[String]) -> Result<Vec<glob::Pattern>> {
    patterns
        .iter()
        .map(|p| {
            glob::Pattern::new(p).map_err(|e| {
                EngineError::validation_with_code(
                    ErrorCode::VALIDATION_INVALID_INPUT,
                    format!("Invalid glob pattern '{}': {}", p, e),
                    Some("patterns".to_string()),
                )
            })
        })
        .collect()
}

/// Files under `base` matching any include and no exclude, relative and sorted
pub(crate) fn match_files(base: &Path, config: &DocAnalyzeConfig) -> Result<Vec<String>> {
    let (negated, includes): (Vec<&String>, Vec<&String>) =
        config.patterns.iter().partition(|p| p.starts_with('!'));
    let mut excludes: Vec<String> = config.exclude_patterns.clone();
    excludes.extend(negated.iter().map(|p| p[1..].to_string()));
    let excludes = compile(&excludes)?;

    let mut found = BTreeSet::new();
    for pattern in includes {
        compile(std::slice::from_ref(pattern))?;
        let absolute = base.join(pattern);
        let entries = glob::glob(&absolute.to_string_lossy()).map_err(|e| {
            EngineError::validation_with_code(
                ErrorCode::VALIDATION_INVALID_INPUT,
                format!("Invalid glob pattern '{}': {}", pattern, e),
                Some("patterns".to_string()),
            )
        })?;
        for path in entries.filter_map(|e| e.ok()).filter(|p| p.is_file()) {
            let Ok(relative) = path.strip_prefix(base) else {
                continue;
            };
            let relative = relative.to_string_lossy().replace('\\', "/");
            if excludes.iter().any(|x| x.matches(&relative)) {
                continue;
            }
            found.insert(relative);
        }
    }
    Ok(found.into_iter().collect())
}

async fn analyze_file(base: &Path, relative: String, target: f64) -> AnalyzedFile {
    let full = base.join(&relative);
    let file_type = file_type(&relative).to_string();
    let last_modified = tokio::fs::metadata(&full)
        .await
        .ok()
        .and_then(|m| m.modified().ok())
        .map(DateTime::<Utc>::from);

    match tokio::fs::read_to_string(&full).await {
        Ok(content) => {
            let elements = scan(&content);
            let coverage = estimate_coverage(&elements);
            debug!(path = %relative, coverage, elements = elements.len(), "Analyzed source file");
            AnalyzedFile {
                path: relative,
                file_type,
                last_modified,
                needs_documentation: coverage < target,
                coverage,
                elements,
                error: None,
            }
        }
        Err(e) => {
            warn!(path = %full.display(), error = %e, "Could not read file for analysis");
            AnalyzedFile {
                path: relative,
                file_type,
                last_modified,
                needs_documentation: true,
                coverage: 0.0,
                elements: Vec::new(),
                error: Some(format!("File read error: {}", e)),
            }
        }
    }
}

pub(super) async fn execute(deps: &ExecutorDeps, step: &PlanStep) -> Result<ExecutionResult> {
    let config: DocAnalyzeConfig = step.data_as()?;
    let base = deps.resolve(&config.base_path);
    info!(base = %base.display(), patterns = ?config.patterns, "Analyzing codebase");

    let matched = match_files(&base, &config)?;
    let mut report = DocAnalysisReport {
        patterns: config.patterns.clone(),
        base_path: base.clone(),
        ..Default::default()
    };
    for relative in matched {
        report
            .files
            .push(analyze_file(&base, relative, config.coverage_target).await);
    }
    report.files_needing_docs = report.files.iter().filter(|f| f.needs_documentation).count();

    let summary = format!(
        "Codebase analysis complete. Found {} file(s); {} need documentation",
        report.files.len(),
        report.files_needing_docs
    );
    Ok(ExecutionResult::succeeded(ResultKind::AnalyzeCodebase, &step.id, summary)
        .with_data(ResultData::DocAnalysis(report)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::cicd::test_support::deps;
    use crate::subprocess::MockProcessRunner;
    use serde_json::json;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let files = [
            ("src/api.ts", "export function getUsers() {}\nexport function postUser() {}\n"),
            (
                "src/util.ts",
                "/** Formats a date for display. */\nexport function format(d) {}\n",
            ),
            ("src/api.spec.ts", "test('x', () => {});\n"),
            ("node_modules/lib/index.js", "export const x = 1;\n"),
            ("README.md", "# readme\n"),
        ];
        for (path, content) in files {
            let full = tmp.path().join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
        }
        tmp
    }

    #[test]
    fn test_match_files_applies_exclusions() {
        let tmp = tree();
        let config = DocAnalyzeConfig {
            patterns: vec!["**/*.ts".into(), "**/*.js".into(), "!**/*.spec.ts".into()],
            ..Default::default()
        };
        let files = match_files(tmp.path(), &config).unwrap();
        assert_eq!(files, vec!["src/api.ts", "src/util.ts"]);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let tmp = tree();
        let config = DocAnalyzeConfig {
            patterns: vec!["src/[".into()],
            ..Default::default()
        };
        let err = match_files(tmp.path(), &config).unwrap_err();
        assert_eq!(err.code(), ErrorCode::VALIDATION_INVALID_INPUT);
    }

    #[tokio::test]
    async fn test_analysis_flags_undocumented_files() {
        let tmp = tree();
        let deps = deps(&MockProcessRunner::new(), json!({}), tmp.path());
        let step = PlanStep::new("analyze", 1, "Analyze").with_data(json!({
            "patterns": ["src/*.ts"],
            "excludePatterns": ["**/*.spec.ts"]
        }));

        let result = execute(&deps, &step).await.unwrap();
        assert!(result.success);
        let ResultData::DocAnalysis(report) = result.data else {
            panic!("expected documentation analysis payload");
        };
        assert_eq!(report.files.len(), 2);
        assert_eq!(report.files_needing_docs, 1);
        let api = &report.files[0];
        assert_eq!(api.path, "src/api.ts");
        assert_eq!(api.file_type, "module");
        assert!(api.needs_documentation);
        assert_eq!(report.files[1].coverage, 1.0);
    }
}
