use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::{debug, info};

use super::analyze::AnalyzeReport;
use super::SECTION;
use crate::error::Result;
use crate::executor::common::write_text;
use crate::executor::ExecutorDeps;
use crate::plan::{ExecutionContext, ExecutionResult, PlanStep, ResultData, ResultKind};

const BAR_HEIGHT: usize = 24;
const CHART_WIDTH: f64 = 480.0;
const LABEL_WIDTH: usize = 140;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VisualizeConfig {
    pub visualization_types: Vec<String>,
    pub interactive: bool,
}

impl Default for VisualizeConfig {
    fn default() -> Self {
        Self {
            visualization_types: vec!["bar_chart".to_string(), "summary_table".to_string()],
            interactive: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualArtifact {
    pub kind: String,
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizeReport {
    pub artifacts: Vec<VisualArtifact>,
    pub skipped: Vec<String>,
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Horizontal bars of each field's mean, scaled to the largest magnitude
pub(crate) fn bar_chart(analysis: &AnalyzeReport) -> String {
    let stats = &analysis.statistics;
    let peak = stats
        .iter()
        .map(|s| s.mean.abs())
        .fold(0.0_f64, f64::max);
    let height = (stats.len() + 1) * BAR_HEIGHT;
    let width = LABEL_WIDTH + CHART_WIDTH as usize + 80;

    let mut svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\">\n",
        width, height
    );
    let _ = writeln!(
        svg,
        "  <text x=\"4\" y=\"16\" font-size=\"14\">Mean by field ({} records)</text>",
        analysis.record_count
    );
    for (i, s) in stats.iter().enumerate() {
        let y = (i + 1) * BAR_HEIGHT;
        let bar = if peak > 0.0 {
            s.mean.abs() / peak * CHART_WIDTH
        } else {
            0.0
        };
        let _ = writeln!(
            svg,
            "  <text x=\"4\" y=\"{}\" font-size=\"12\">{}</text>",
            y + 16,
            escape_xml(&s.field)
        );
        let _ = writeln!(
            svg,
            "  <rect x=\"{}\" y=\"{}\" width=\"{:.1}\" height=\"{}\" fill=\"#4e79a7\"/>",
            LABEL_WIDTH,
            y + 4,
            bar,
            BAR_HEIGHT - 8
        );
        let _ = writeln!(
            svg,
            "  <text x=\"{:.1}\" y=\"{}\" font-size=\"12\">{:.2}</text>",
            LABEL_WIDTH as f64 + bar + 6.0,
            y + 16,
            s.mean
        );
    }
    svg.push_str("</svg>\n");
    svg
}

pub(crate) fn summary_table(analysis: &AnalyzeReport) -> String {
    let mut md = format!("# Summary ({} records)\n\n", analysis.record_count);
    md.push_str("| Field | Count | Mean | Median | Min | Max | Std Dev |\n");
    md.push_str("|---|---|---|---|---|---|---|\n");
    for s in &analysis.statistics {
        let _ = writeln!(
            md,
            "| {} | {} | {:.2} | {:.2} | {:.2} | {:.2} | {:.2} |",
            s.field, s.count, s.mean, s.median, s.min, s.max, s.std_dev
        );
    }
    md
}

pub(crate) fn correlation_matrix(analysis: &AnalyzeReport) -> String {
    let fields: Vec<&str> = analysis.statistics.iter().map(|s| s.field.as_str()).collect();
    let width = fields.iter().map(|f| f.len()).max().unwrap_or(0).max(6);
    let coefficient = |a: &str, b: &str| -> Option<f64> {
        if a == b {
            return Some(1.0);
        }
        analysis
            .correlations
            .iter()
            .find(|c| (c.left == a && c.right == b) || (c.left == b && c.right == a))
            .and_then(|c| c.coefficient)
    };

    let mut out = format!("{:width$}", "", width = width);
    for f in &fields {
        let _ = write!(out, " {:>width$}", f, width = width);
    }
    out.push('\n');
    for row in &fields {
        let _ = write!(out, "{:width$}", row, width = width);
        for col in &fields {
            match coefficient(row, col) {
                Some(r) => {
                    let _ = write!(out, " {:>width$.3}", r, width = width);
                }
                None => {
                    let _ = write!(out, " {:>width$}", "n/a", width = width);
                }
            }
        }
        out.push('\n');
    }
    out
}

pub(super) async fn execute(
    deps: &ExecutorDeps,
    step: &PlanStep,
    context: &ExecutionContext,
) -> Result<ExecutionResult> {
    let config: VisualizeConfig = step.data_as()?;
    let analysis = match context.latest_analysis() {
        Some((result, report)) if result.success => report,
        _ => {
            return Ok(ExecutionResult::failed(
                ResultKind::Visualize,
                &step.id,
                "No analysis results available for visualization",
            ))
        }
    };

    let dir = deps
        .config_value::<String>(SECTION, "visualizationDir")
        .map(|d| deps.resolve(d))
        .unwrap_or_else(|| deps.settings.report_dir().join("visualizations"));
    if config.interactive {
        debug!("Interactive output is not supported; rendering static artifacts");
    }

    let mut report = VisualizeReport::default();
    for kind in &config.visualization_types {
        let (file, content) = match kind.as_str() {
            "bar_chart" => ("bar_chart.svg", bar_chart(analysis)),
            "summary_table" => ("summary_table.md", summary_table(analysis)),
            "correlation_matrix" => ("correlation_matrix.txt", correlation_matrix(analysis)),
            other => {
                debug!(visualization = other, "Skipping unsupported visualization");
                report.skipped.push(other.to_string());
                continue;
            }
        };
        let path = write_text(&dir.join(file), &content).await?;
        report.artifacts.push(VisualArtifact {
            kind: kind.clone(),
            path,
            size: content.len() as u64,
        });
    }

    info!(
        artifacts = report.artifacts.len(),
        skipped = report.skipped.len(),
        dir = %dir.display(),
        "Visualization finished"
    );
    let result = if report.artifacts.is_empty() {
        ExecutionResult::failed(
            ResultKind::Visualize,
            &step.id,
            format!(
                "No supported visualization types requested ({})",
                report.skipped.join(", ")
            ),
        )
    } else {
        ExecutionResult::succeeded(
            ResultKind::Visualize,
            &step.id,
            format!("Created {} visualization(s)", report.artifacts.len()),
        )
    };
    Ok(result.with_data(ResultData::Visualize(report)))
}
