use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{EngineError, ErrorCode, Result};
use crate::executor::common::{storage_error, write_json};
use crate::executor::ExecutorDeps;
use crate::plan::{ExecutionContext, ExecutionResult, PlanStep, ResultData, ResultKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreFormat {
    #[default]
    Json,
    Jsonl,
    Csv,
}

impl StoreFormat {
    fn extension(self) -> &'static str {
        match self {
            StoreFormat::Json => "json",
            StoreFormat::Jsonl => "jsonl",
            StoreFormat::Csv => "csv",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Gzip,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    pub destination: String,
    pub format: StoreFormat,
    pub compression: Compression,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            destination: "./data/processed".to_string(),
            format: StoreFormat::Json,
            compression: Compression::None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub compressed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreReport {
    pub destination: PathBuf,
    pub format: StoreFormat,
    pub compression: Compression,
    pub record_count: usize,
    pub files: Vec<StoredFile>,
    pub total_bytes: u64,
    pub manifest_path: PathBuf,
}

fn csv_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// CSV with the union of record keys as header, in first-seen order
pub(crate) fn to_csv(records: &[Value]) -> std::result::Result<Vec<u8>, csv::Error> {
    let mut seen = HashSet::new();
    let headers: Vec<&str> = records
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|m| m.keys())
        .filter(|k| seen.insert(k.as_str()))
        .map(String::as_str)
        .collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&headers)?;
    for record in records {
        let row: Vec<String> = headers
            .iter()
            .map(|h| record.get(*h).map(csv_cell).unwrap_or_default())
            .collect();
        writer.write_record(&row)?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

fn encode(records: &[Value], format: StoreFormat) -> Result<Vec<u8>> {
    match format {
        StoreFormat::Json => Ok(serde_json::to_vec_pretty(records)?),
        StoreFormat::Jsonl => {
            let mut out = Vec::new();
            for record in records {
                serde_json::to_writer(&mut out, record)?;
                out.push(b'\n');
            }
            Ok(out)
        }
        StoreFormat::Csv => to_csv(records).map_err(|e| {
            EngineError::storage_with_code(ErrorCode::STORAGE_IO_ERROR, "Failed to encode CSV", None)
                .with_source(e)
        }),
    }
}

fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    use flate2::write::GzEncoder;

    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

async fn write_bytes(path: &Path, bytes: &[u8]) -> Result<u64> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| storage_error(parent, "create directory", e))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| storage_error(path, "write", e))?;
    Ok(bytes.len() as u64)
}

async fn copy_into(source: &Path, dir: &Path) -> Result<Option<StoredFile>> {
    let Some(name) = source.file_name() else {
        return Ok(None);
    };
    if !source.is_file() {
        debug!(path = %source.display(), "Skipping missing artifact");
        return Ok(None);
    }
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| storage_error(dir, "create directory", e))?;
    let target = dir.join(name);
    let size = tokio::fs::copy(source, &target)
        .await
        .map_err(|e| storage_error(source, "copy", e))?;
    Ok(Some(StoredFile {
        name: name.to_string_lossy().into_owned(),
        path: target,
        size,
        compressed: false,
    }))
}

pub(super) async fn execute(
    deps: &ExecutorDeps,
    step: &PlanStep,
    context: &ExecutionContext,
) -> Result<ExecutionResult> {
    let config: StoreConfig = step.data_as()?;
    let records = context.latest_records();
    let reports: Vec<PathBuf> = context
        .latest_analysis()
        .map(|(_, a)| a.reports.clone())
        .unwrap_or_default();
    let visuals: Vec<PathBuf> = context
        .latest_visualization()
        .map(|(_, v)| v.artifacts.iter().map(|a| a.path.clone()).collect())
        .unwrap_or_default();

    if records.is_none() && reports.is_empty() && visuals.is_empty() {
        return Ok(ExecutionResult::failed(
            ResultKind::Store,
            &step.id,
            "No data or results available to store",
        ));
    }

    let destination = deps.resolve(&config.destination);
    let mut report = StoreReport {
        destination: destination.clone(),
        format: config.format,
        compression: config.compression,
        ..Default::default()
    };

    if let Some(records) = records {
        let mut bytes = encode(records, config.format)?;
        let mut name = format!("data.{}", config.format.extension());
        let compressed = config.compression == Compression::Gzip;
        if compressed {
            bytes = gzip(&bytes).map_err(|e| {
                EngineError::storage_with_code(
                    ErrorCode::STORAGE_IO_ERROR,
                    "Failed to compress data",
                    None,
                )
                .with_source(e)
            })?;
            name.push_str(".gz");
        }
        let path = destination.join(&name);
        let size = write_bytes(&path, &bytes).await?;
        report.record_count = records.len();
        report.files.push(StoredFile {
            name,
            path,
            size,
            compressed,
        });
    }

    for path in &reports {
        if let Some(file) = copy_into(path, &destination.join("reports")).await? {
            report.files.push(file);
        }
    }
    for path in &visuals {
        if let Some(file) = copy_into(path, &destination.join("visualizations")).await? {
            report.files.push(file);
        }
    }
    report.total_bytes = report.files.iter().map(|f| f.size).sum();

    let manifest = json!({
        "createdAt": chrono::Utc::now().to_rfc3339(),
        "stepId": step.id,
        "format": config.format,
        "compression": config.compression,
        "recordCount": report.record_count,
        "files": report.files,
        "totalBytes": report.total_bytes,
    });
    report.manifest_path = write_json(&destination.join("manifest.json"), &manifest).await?;

    info!(
        destination = %destination.display(),
        records = report.record_count,
        files = report.files.len(),
        bytes = report.total_bytes,
        "Stored processed data"
    );
    let summary = format!(
        "Stored {} record(s) and {} file(s) in {}",
        report.record_count,
        report.files.len(),
        destination.display()
    );
    Ok(ExecutionResult::succeeded(ResultKind::Store, &step.id, summary)
        .with_data(ResultData::Store(report)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::cicd::test_support::deps;
    use crate::executor::data::CollectReport;
    use crate::subprocess::MockProcessRunner;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    fn context(records: Vec<Value>) -> ExecutionContext {
        let mut ctx = ExecutionContext::new();
        ctx.record(
            ExecutionResult::succeeded(ResultKind::Collect, "collect", "ok").with_data(
                ResultData::Collect(CollectReport {
                    total_records: records.len(),
                    records,
                    ..Default::default()
                }),
            ),
        )
        .unwrap();
        ctx
    }

    #[test]
    fn test_csv_header_union() {
        let bytes = to_csv(&[
            json!({ "id": 1, "name": "a" }),
            json!({ "id": 2, "tags": ["x"], "name": null }),
        ])
        .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "id,name,tags\n1,a,\n2,,\"[\"\"x\"\"]\"\n");
    }

    #[tokio::test]
    async fn test_gzip_jsonl() {
        let tmp = TempDir::new().unwrap();
        let deps = deps(&MockProcessRunner::new(), json!({}), tmp.path());
        let step = PlanStep::new("store", 6, "Store").with_data(json!({
            "destination": "out", "format": "jsonl", "compression": "gzip"
        }));

        let result = execute(&deps, &step, &context(vec![json!({ "a": 1 }), json!({ "a": 2 })]))
            .await
            .unwrap();
        assert!(result.success);

        let raw = std::fs::read(tmp.path().join("out/data.jsonl.gz")).unwrap();
        let mut text = String::new();
        GzDecoder::new(raw.as_slice()).read_to_string(&mut text).unwrap();
        assert_eq!(text, "{\"a\":1}\n{\"a\":2}\n");

        let manifest: Value =
            serde_json::from_str(&std::fs::read_to_string(tmp.path().join("out/manifest.json")).unwrap())
                .unwrap();
        assert_eq!(manifest["recordCount"], 2);
        assert_eq!(manifest["files"][0]["compressed"], true);
    }

    #[tokio::test]
    async fn test_nothing_to_store() {
        let tmp = TempDir::new().unwrap();
        let deps = deps(&MockProcessRunner::new(), json!({}), tmp.path());
        let result = execute(&deps, &PlanStep::new("store", 6, "Store"), &ExecutionContext::new())
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("No data or results available to store"));
    }
}
