use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::error::Result;
use crate::executor::ExecutorDeps;
use crate::plan::{ExecutionContext, ExecutionResult, PlanStep, ResultData, ResultKind};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyzeConfig {
    pub analysis_types: Vec<String>,
    pub generate_reports: bool,
    /// Restrict statistics to these fields
    pub fields: Option<Vec<String>>,
}

impl Default for AnalyzeConfig {
    fn default() -> Self {
        Self {
            analysis_types: vec!["statistical".to_string(), "exploratory".to_string()],
            generate_reports: true,
            fields: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldStats {
    pub field: String,
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// Sample standard deviation; zero for a single value
    pub std_dev: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Correlation {
    pub left: String,
    pub right: String,
    /// Pearson coefficient, absent when either side has no variance
    pub coefficient: Option<f64>,
    pub pairs: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeReport {
    pub record_count: usize,
    pub analysis_types: Vec<String>,
    pub statistics: Vec<FieldStats>,
    pub correlations: Vec<Correlation>,
    pub reports: Vec<PathBuf>,
}

/// Numeric columns in field-name order
fn numeric_columns(records: &[Value], only: Option<&[String]>) -> BTreeMap<String, Vec<Option<f64>>> {
    let mut columns: BTreeMap<String, Vec<Option<f64>>> = BTreeMap::new();
    for (row, record) in records.iter().enumerate() {
        let Some(map) = record.as_object() else { continue };
        for (field, value) in map {
            if only.is_some_and(|f| !f.contains(field)) {
                continue;
            }
            if let Some(n) = value.as_f64() {
                let column = columns.entry(field.clone()).or_default();
                column.resize(row, None);
                column.push(Some(n));
            }
        }
    }
    for column in columns.values_mut() {
        column.resize(records.len(), None);
    }
    columns
}

pub(crate) fn describe(field: &str, values: &[f64]) -> Option<FieldStats> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let count = sorted.len();
    let mean = sorted.iter().sum::<f64>() / count as f64;
    let median = if count % 2 == 0 {
        (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
    } else {
        sorted[count / 2]
    };
    let std_dev = if count > 1 {
        let var = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        var.sqrt()
    } else {
        0.0
    };
    Some(FieldStats {
        field: field.to_string(),
        count,
        mean,
        median,
        min: sorted[0],
        max: sorted[count - 1],
        std_dev,
    })
}

pub(crate) fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let mx = xs.iter().sum::<f64>() / n as f64;
    let my = ys.iter().sum::<f64>() / n as f64;
    let (mut cov, mut vx, mut vy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        cov += (x - mx) * (y - my);
        vx += (x - mx).powi(2);
        vy += (y - my).powi(2);
    }
    if vx == 0.0 || vy == 0.0 {
        return None;
    }
    Some(cov / (vx.sqrt() * vy.sqrt()))
}

fn correlations(columns: &BTreeMap<String, Vec<Option<f64>>>) -> Vec<Correlation> {
    let names: Vec<&String> = columns.keys().collect();
    let mut out = Vec::new();
    for (i, left) in names.iter().enumerate() {
        for right in &names[i + 1..] {
            let (xs, ys): (Vec<f64>, Vec<f64>) = columns[*left]
                .iter()
                .zip(&columns[*right])
                .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
                .unzip();
            out.push(Correlation {
                left: (*left).clone(),
                right: (*right).clone(),
                coefficient: pearson(&xs, &ys),
                pairs: xs.len(),
            });
        }
    }
    out
}

/// Per-field shape of the record set: how often each field is present and
/// which JSON types it holds
fn explore(records: &[Value]) -> Value {
    let mut fields: BTreeMap<String, (usize, BTreeMap<&'static str, usize>)> = BTreeMap::new();
    for map in records.iter().filter_map(Value::as_object) {
        for (field, value) in map {
            let type_name = match value {
                Value::Null => "null",
                Value::Bool(_) => "boolean",
                Value::Number(_) => "number",
                Value::String(_) => "string",
                Value::Array(_) => "array",
                Value::Object(_) => "object",
            };
            let entry = fields.entry(field.clone()).or_default();
            entry.0 += 1;
            *entry.1.entry(type_name).or_default() += 1;
        }
    }
    let fields: BTreeMap<String, Value> = fields
        .into_iter()
        .map(|(name, (present, types))| {
            (
                name,
                json!({ "present": present, "missing": records.len() - present, "types": types }),
            )
        })
        .collect();
    json!({ "recordCount": records.len(), "fields": fields })
}

pub(super) async fn execute(
    deps: &ExecutorDeps,
    step: &PlanStep,
    context: &ExecutionContext,
) -> Result<ExecutionResult> {
    let config: AnalyzeConfig = step.data_as()?;
    let records = context.latest_records().unwrap_or_default();
    if records.is_empty() {
        return Ok(ExecutionResult::failed(
            ResultKind::Analyze,
            &step.id,
            "No data available for analysis",
        ));
    }

    let columns = numeric_columns(records, config.fields.as_deref());
    let statistics: Vec<FieldStats> = columns
        .iter()
        .filter_map(|(field, column)| {
            let values: Vec<f64> = column.iter().flatten().copied().collect();
            describe(field, &values)
        })
        .collect();
    let correlations = correlations(&columns);
    debug!(
        fields = statistics.len(),
        pairs = correlations.len(),
        "Computed descriptive statistics"
    );

    let mut report = AnalyzeReport {
        record_count: records.len(),
        analysis_types: config.analysis_types.clone(),
        statistics,
        correlations,
        reports: Vec::new(),
    };

    if config.generate_reports {
        for analysis in &config.analysis_types {
            let body = match analysis.as_str() {
                "statistical" | "descriptive" => json!({ "statistics": report.statistics }),
                "correlation" => json!({ "correlations": report.correlations }),
                "exploratory" => explore(records),
                _ => json!({
                    "statistics": report.statistics,
                    "correlations": report.correlations
                }),
            };
            let content = json!({
                "type": analysis,
                "recordCount": report.record_count,
                "generatedAt": chrono::Utc::now().to_rfc3339(),
                "results": body,
            });
            let file = format!("analysis-{}.json", analysis);
            report.reports.push(deps.write_report(&file, &content).await?);
        }
    }

    info!(
        records = report.record_count,
        fields = report.statistics.len(),
        reports = report.reports.len(),
        "Analysis finished"
    );
    let summary = format!(
        "Analyzed {} record(s) across {} numeric field(s)",
        report.record_count,
        report.statistics.len()
    );
    Ok(ExecutionResult::succeeded(ResultKind::Analyze, &step.id, summary)
        .with_data(ResultData::Analyze(report)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::cicd::test_support::deps;
    use crate::executor::data::CollectReport;
    use crate::subprocess::MockProcessRunner;
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
    fn test_describe() {
        let stats = describe("x", &[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean, 2.5);
        assert_eq!(stats.median, 2.5);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
        assert!((stats.std_dev - 1.2909944).abs() < 1e-6);
        assert!(describe("x", &[]).is_none());
    }

    #[test]
    fn test_pearson() {
        let r = pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]).unwrap();
        assert!((r - 1.0).abs() < 1e-12);
        let r = pearson(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]).unwrap();
        assert!((r + 1.0).abs() < 1e-12);
        assert!(pearson(&[1.0, 1.0], &[1.0, 2.0]).is_none());
    }

    #[tokio::test]
    async fn test_statistics_and_reports() {
        let tmp = TempDir::new().unwrap();
        let deps = deps(&MockProcessRunner::new(), json!({}), tmp.path());
        let ctx = context(vec![
            json!({ "a": 1, "b": 10, "label": "x" }),
            json!({ "a": 2, "b": 20 }),
            json!({ "a": 3 }),
        ]);
        let step = PlanStep::new("analyze", 4, "Analyze").with_data(json!({
            "analysisTypes": ["statistical", "exploratory"]
        }));

        let result = execute(&deps, &step, &ctx).await.unwrap();
        assert!(result.success);
        let ResultData::Analyze(report) = result.data else {
            panic!("expected analysis payload");
        };
        let fields: Vec<&str> = report.statistics.iter().map(|s| s.field.as_str()).collect();
        assert_eq!(fields, vec!["a", "b"]);
        assert_eq!(report.statistics[1].count, 2);
        assert_eq!(report.correlations.len(), 1);
        assert_eq!(report.correlations[0].pairs, 2);

        let exploratory: Value = serde_json::from_str(
            &std::fs::read_to_string(tmp.path().join("reports/analysis-exploratory.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(exploratory["results"]["fields"]["b"]["missing"], 1);
        assert_eq!(report.reports.len(), 2);
    }

    #[tokio::test]
    async fn test_requires_records() {
        let tmp = TempDir::new().unwrap();
        let deps = deps(&MockProcessRunner::new(), json!({}), tmp.path());
        let result = execute(&deps, &PlanStep::new("analyze", 4, "Analyze"), &ExecutionContext::new())
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("No data available for analysis"));
    }
}
