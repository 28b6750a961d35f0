use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::plan::{ExecutionResult, ResultData, ResultKind};
use crate::tools::{methods, ToolClient};

/// Token budget requested from the documentation lookup tool
pub const DOCS_TOKEN_BUDGET: u32 = 7000;

/// Payload of a `context` step
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextReport {
    pub search_term: String,
    pub library: Option<String>,
    pub library_id: Option<String>,
    pub matched_name: Option<String>,
    pub documentation: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LibraryMatch {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    score: Option<f64>,
}

/// Resolve `library` to a tool-side id, then fetch documentation on `search_term`
pub(crate) async fn lookup(
    client: &dyn ToolClient,
    step_id: &str,
    search_term: &str,
    library: Option<&str>,
) -> ExecutionResult {
    let mut report = ContextReport {
        search_term: search_term.to_string(),
        library: library.map(str::to_string),
        ..Default::default()
    };
    let fail = |report: ContextReport, error: String| {
        warn!(step_id, error = %error, "Context lookup failed");
        ExecutionResult::failed(ResultKind::Context, step_id, error)
            .with_data(ResultData::Context(report))
    };

    if search_term.trim().is_empty() {
        return fail(report, "Search term is required for a context step".to_string());
    }
    let Some(library) = library.filter(|l| !l.trim().is_empty()) else {
        let message = format!(
            "Context search for \"{}\" requires a library name. No library specified.",
            search_term
        );
        return fail(report, message);
    };

    let resolved = match client
        .invoke(methods::RESOLVE_LIBRARY_ID, json!({ "libraryName": library }))
        .await
    {
        Ok(value) => value,
        Err(e) => {
            return fail(
                report,
                format!("Could not resolve library ID for \"{}\": {}", library, e),
            )
        }
    };

    let mut matches: Vec<LibraryMatch> = resolved
        .get("results")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();
    if matches.is_empty() {
        return fail(
            report,
            format!(
                "Could not resolve library ID for \"{}\": no matching libraries",
                library
            ),
        );
    }
    matches.sort_by(|a, b| {
        b.score
            .unwrap_or(0.0)
            .partial_cmp(&a.score.unwrap_or(0.0))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let best = &matches[0];
    report.library_id = Some(best.id.clone());
    report.matched_name = Some(best.name.clone());
    info!(step_id, library, library_id = %best.id, "Resolved library");

    let docs = match client
        .invoke(
            methods::GET_LIBRARY_DOCS,
            json!({
                "context7CompatibleLibraryID": best.id,
                "topic": search_term,
                "tokens": DOCS_TOKEN_BUDGET,
            }),
        )
        .await
    {
        Ok(value) => value,
        Err(e) => {
            let message = format!(
                "Failed to get documentation for \"{}\" in \"{}\": {}",
                search_term, best.id, e
            );
            return fail(report, message);
        }
    };

    let documentation = match &docs {
        Value::String(text) => Some(text.clone()),
        other => other
            .get("documentation")
            .and_then(Value::as_str)
            .map(str::to_string),
    };
    let Some(documentation) = documentation.filter(|d| !d.trim().is_empty()) else {
        let message = format!(
            "Failed to get documentation for \"{}\" in \"{}\": no documentation returned",
            search_term, best.id
        );
        return fail(report, message);
    };

    report.sources = docs
        .get("sources")
        .and_then(|s| serde_json::from_value(s.clone()).ok())
        .unwrap_or_default();
    report.documentation = Some(documentation);
    let summary = format!(
        "Retrieved documentation for \"{}\" in \"{}\". {} sources.",
        search_term,
        best.id,
        report.sources.len()
    );
    ExecutionResult::succeeded(ResultKind::Context, step_id, summary)
        .with_data(ResultData::Context(report))
}
