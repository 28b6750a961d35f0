use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::SECTION;
use crate::config::lookup_path;
use crate::error::{EngineError, ErrorCode, Result};
use crate::executor::ExecutorDeps;
use crate::plan::{ExecutionResult, PlanStep, ResultData, ResultKind};

const DEFAULT_MAX_RECORDS: usize = 10_000;
const DEFAULT_DATABASE_COMMAND: &str = "sqlite3 -json";

/// Where records come from. A bare string is an HTTP(S) URL or a file or
/// directory path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceSpec {
    Location(String),
    Http {
        url: String,
        /// Dotted path to the record array inside the response
        #[serde(default, rename = "recordsPath")]
        records_path: Option<String>,
    },
    Database {
        database: String,
        query: String,
    },
    File {
        path: String,
        #[serde(default)]
        format: Option<String>,
    },
}

impl SourceSpec {
    fn label(&self) -> String {
        match self {
            SourceSpec::Location(s) => s.clone(),
            SourceSpec::Http { url, .. } => url.clone(),
            SourceSpec::Database { database, .. } => database.clone(),
            SourceSpec::File { path, .. } => path.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectConfig {
    pub sources: Vec<SourceSpec>,
    /// File formats picked up when a source is a directory
    pub formats: Vec<String>,
    pub max_records_in_context: Option<usize>,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            formats: vec!["json".to_string(), "jsonl".to_string(), "csv".to_string()],
            max_records_in_context: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatus {
    pub source: String,
    pub kind: String,
    pub success: bool,
    pub records: usize,
    pub files: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectReport {
    /// Records carried forward, at most `maxRecordsInContext`
    pub records: Vec<Value>,
    /// Records read across all sources before capping
    pub total_records: usize,
    pub sampled: bool,
    pub sources: Vec<SourceStatus>,
}

/// Format implied by a file extension
fn format_of(path: &Path) -> Option<&'static str> {
    match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
        "json" => Some("json"),
        "jsonl" | "ndjson" => Some("jsonl"),
        "csv" => Some("csv"),
        _ => None,
    }
}

/// Arrays yield their elements; any other value is a single record
fn into_records(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

/// CSV cell as the most specific JSON value it spells; empty cells are null
fn csv_cell(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() {
            return Value::from(f);
        }
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

pub(crate) fn parse_content(content: &str, format: &str) -> std::result::Result<Vec<Value>, String> {
    match format {
        "json" => serde_json::from_str(content)
            .map(into_records)
            .map_err(|e| format!("invalid JSON: {}", e)),
        "jsonl" => content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(i, line)| {
                serde_json::from_str(line).map_err(|e| format!("invalid JSON on line {}: {}", i + 1, e))
            })
            .collect(),
        "csv" => {
            let mut reader = csv::Reader::from_reader(content.as_bytes());
            let headers = reader
                .headers()
                .map_err(|e| format!("invalid CSV header: {}", e))?
                .clone();
            reader
                .records()
                .map(|row| {
                    let row = row.map_err(|e| format!("invalid CSV row: {}", e))?;
                    let record: Map<String, Value> = headers
                        .iter()
                        .zip(row.iter())
                        .map(|(h, cell)| (h.to_string(), csv_cell(cell)))
                        .collect();
                    Ok(Value::Object(record))
                })
                .collect()
        }
        other => Err(format!("unsupported format '{}'", other)),
    }
}

async fn read_file(path: &Path, format: &str) -> std::result::Result<Vec<Value>, String> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    parse_content(&content, format)
}

/// Files under `dir` whose format is one of `formats`, in path order
fn files_in(dir: &Path, formats: &[String]) -> Vec<(PathBuf, &'static str)> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let format = format_of(e.path())?;
            formats
                .iter()
                .any(|f| f == format)
                .then(|| (e.path().to_path_buf(), format))
        })
        .collect()
}

async fn collect_path(
    deps: &ExecutorDeps,
    raw: &str,
    format: Option<&str>,
    formats: &[String],
    status: &mut SourceStatus,
) -> std::result::Result<Vec<Value>, String> {
    let path = deps.resolve(raw);
    status.kind = "file".to_string();
    if path.is_dir() {
        let files = files_in(&path, formats);
        if files.is_empty() {
            return Err(format!("no {} files in {}", formats.join("/"), path.display()));
        }
        let mut records = Vec::new();
        for (file, format) in files {
            records.extend(read_file(&file, format).await?);
            status.files += 1;
        }
        return Ok(records);
    }
    if !path.exists() {
        return Err(format!("{} does not exist", path.display()));
    }
    let format = format
        .or_else(|| format_of(&path))
        .ok_or_else(|| format!("cannot tell the format of {}", path.display()))?;
    status.files = 1;
    read_file(&path, format).await
}

async fn collect_http(
    deps: &ExecutorDeps,
    url: &str,
    records_path: Option<&str>,
    status: &mut SourceStatus,
) -> std::result::Result<Vec<Value>, String> {
    status.kind = "http".to_string();
    let response = deps
        .http
        .get(url)
        .send()
        .await
        .map_err(|e| format!("request failed: {}", e))?;
    if !response.status().is_success() {
        return Err(format!("server answered {}", response.status()));
    }
    let body: Value = response
        .json()
        .await
        .map_err(|e| format!("response is not JSON: {}", e))?;
    match records_path {
        Some(path) => lookup_path(&body, path)
            .cloned()
            .map(into_records)
            .ok_or_else(|| format!("no '{}' in response", path)),
        None => Ok(into_records(body)),
    }
}

async fn collect_database(
    deps: &ExecutorDeps,
    database: &str,
    query: &str,
    status: &mut SourceStatus,
) -> std::result::Result<Vec<Value>, String> {
    status.kind = "database".to_string();
    let command = deps
        .configured_command(SECTION, "databaseCommand", DEFAULT_DATABASE_COMMAND)
        .map_err(|e| e.to_string())?
        .arg(&deps.resolve(database).to_string_lossy())
        .arg(query)
        .build();
    let output = deps.run(command).await.map_err(|e| e.to_string())?;
    if !output.status.success() {
        return Err(format!(
            "database command exited with {}: {}",
            output.status,
            output.stderr.trim()
        ));
    }
    // sqlite3 prints nothing at all for an empty result set
    if output.stdout.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&output.stdout)
        .map(into_records)
        .map_err(|e| format!("database output is not JSON: {}", e))
}

pub(super) async fn execute(deps: &ExecutorDeps, step: &PlanStep) -> Result<ExecutionResult> {
    let config: CollectConfig = step.data_as()?;
    if config.sources.is_empty() {
        return Err(EngineError::validation_with_code(
            ErrorCode::VALIDATION_REQUIRED_FIELD,
            "No data sources configured",
            Some("sources".to_string()),
        ));
    }
    let limit = config
        .max_records_in_context
        .or_else(|| deps.config_value(SECTION, "maxRecordsInContext"))
        .unwrap_or(DEFAULT_MAX_RECORDS);

    let mut report = CollectReport::default();
    for source in &config.sources {
        let mut status = SourceStatus {
            source: source.label(),
            ..Default::default()
        };
        let outcome = match source {
            SourceSpec::Location(s) if s.starts_with("http://") || s.starts_with("https://") => {
                collect_http(deps, s, None, &mut status).await
            }
            SourceSpec::Location(s) => {
                collect_path(deps, s, None, &config.formats, &mut status).await
            }
            SourceSpec::Http { url, records_path } => {
                collect_http(deps, url, records_path.as_deref(), &mut status).await
            }
            SourceSpec::Database { database, query } => {
                collect_database(deps, database, query, &mut status).await
            }
            SourceSpec::File { path, format } => {
                collect_path(deps, path, format.as_deref(), &config.formats, &mut status).await
            }
        };

        match outcome {
            Ok(records) => {
                debug!(source = %status.source, records = records.len(), "Collected source");
                status.success = true;
                status.records = records.len();
                report.total_records += records.len();
                let room = limit.saturating_sub(report.records.len());
                report.records.extend(records.into_iter().take(room));
            }
            Err(error) => {
                warn!(source = %status.source, error = %error, "Source collection failed");
                status.error = Some(error);
            }
        }
        report.sources.push(status);
    }
    report.sampled = report.total_records > report.records.len();

    let succeeded = report.sources.iter().filter(|s| s.success).count();
    info!(
        sources = report.sources.len(),
        succeeded,
        records = report.total_records,
        sampled = report.sampled,
        "Data collection finished"
    );

    let mut summary = format!(
        "Collected {} records from {} of {} source(s)",
        report.total_records,
        succeeded,
        report.sources.len()
    );
    if report.sampled {
        summary.push_str(&format!("; carrying a sample of {}", report.records.len()));
    }
    let result = if succeeded > 0 {
        ExecutionResult::succeeded(ResultKind::Collect, &step.id, summary)
    } else {
        let reasons: Vec<String> = report
            .sources
            .iter()
            .filter_map(|s| s.error.as_ref().map(|e| format!("{}: {}", s.source, e)))
            .collect();
        ExecutionResult::failed(
            ResultKind::Collect,
            &step.id,
            format!("All data sources failed ({})", reasons.join("; ")),
        )
    };
    Ok(result.with_data(ResultData::Collect(report)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::cicd::test_support::deps;
    use crate::subprocess::MockProcessRunner;
    use crate::testing::{StubResponse, StubServer};
    use serde_json::json;
    use tempfile::TempDir;

    fn unpack(result: ExecutionResult) -> CollectReport {
        match result.data {
            ResultData::Collect(report) => report,
            other => panic!("expected collect payload, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_formats() {
        let csv = parse_content("name,age,active\nAda,36,true\nBob,,false\n", "csv").unwrap();
        assert_eq!(csv[0], json!({ "name": "Ada", "age": 36, "active": true }));
        assert_eq!(csv[1]["age"], Value::Null);

        let jsonl = parse_content("{\"a\":1}\n\n{\"a\":2}\n", "jsonl").unwrap();
        assert_eq!(jsonl.len(), 2);

        assert_eq!(parse_content("{\"a\":1}", "json").unwrap().len(), 1);
        assert!(parse_content("{", "json").is_err());
    }

    #[tokio::test]
    async fn test_directory_and_missing_source() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("raw")).unwrap();
        std::fs::write(tmp.path().join("raw/a.json"), r#"[{"x":1},{"x":2}]"#).unwrap();
        std::fs::write(tmp.path().join("raw/b.jsonl"), "{\"x\":3}\n").unwrap();
        std::fs::write(tmp.path().join("raw/notes.txt"), "ignored").unwrap();
        let runner = MockProcessRunner::new();
        let deps = deps(&runner, json!({}), tmp.path());

        let step = PlanStep::new("collect", 1, "Collect")
            .with_data(json!({ "sources": ["raw", "missing.csv"] }));
        let result = execute(&deps, &step).await.unwrap();
        assert!(result.success);
        let report = unpack(result);
        assert_eq!(report.total_records, 3);
        assert_eq!(report.sources[0].files, 2);
        assert!(!report.sources[1].success);
        assert!(!report.sampled);
    }

    #[tokio::test]
    async fn test_cap_marks_sample() {
        let tmp = TempDir::new().unwrap();
        let rows: Vec<Value> = (0..25).map(|i| json!({ "i": i })).collect();
        std::fs::write(tmp.path().join("big.json"), Value::Array(rows).to_string()).unwrap();
        let runner = MockProcessRunner::new();
        let deps = deps(&runner, json!({}), tmp.path());

        let step = PlanStep::new("collect", 1, "Collect")
            .with_data(json!({ "sources": ["big.json"], "maxRecordsInContext": 10 }));
        let report = unpack(execute(&deps, &step).await.unwrap());
        assert_eq!(report.records.len(), 10);
        assert_eq!(report.total_records, 25);
        assert!(report.sampled);
    }

    #[tokio::test]
    async fn test_http_and_database_sources() {
        let server = StubServer::start(vec![(
            "/orders",
            StubResponse::json(200, &json!({ "data": { "items": [{ "id": 1 }, { "id": 2 }] } })),
        )])
        .await
        .unwrap();
        let tmp = TempDir::new().unwrap();
        let mut runner = MockProcessRunner::new();
        runner
            .expect_command("sqlite3")
            .returns_stdout(r#"[{"id":7,"name":"widget"}]"#)
            .finish();
        let deps = deps(&runner, json!({}), tmp.path());

        let step = PlanStep::new("collect", 1, "Collect").with_data(json!({
            "sources": [
                { "url": server.url("/orders"), "recordsPath": "data.items" },
                { "database": "shop.db", "query": "select * from products" }
            ]
        }));
        let report = unpack(execute(&deps, &step).await.unwrap());
        assert_eq!(report.total_records, 3);
        assert_eq!(report.sources[0].kind, "http");
        assert_eq!(report.records[2]["name"], "widget");

        let call = &runner.get_call_history()[0];
        assert_eq!(call.args[0], "-json");
        assert_eq!(call.args[2], "select * from products");
    }

    #[tokio::test]
    async fn test_all_sources_failing_fails_step() {
        let tmp = TempDir::new().unwrap();
        let runner = MockProcessRunner::new();
        let deps = deps(&runner, json!({}), tmp.path());
        let step = PlanStep::new("collect", 1, "Collect")
            .with_data(json!({ "sources": ["./data/raw"] }));
        let result = execute(&deps, &step).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("All data sources failed"));
    }
}
