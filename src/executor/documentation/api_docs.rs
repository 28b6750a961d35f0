use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tera::escape_html;
use tracing::{info, warn};

use super::extract::{DocItem, ItemKind};
use crate::error::{EngineError, ErrorCode, Result};
use crate::executor::common::write_text;
use crate::executor::ExecutorDeps;
use crate::plan::{ExecutionContext, ExecutionResult, PlanStep, ResultData, ResultKind};

static HANDLER_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(get|post|put|delete|patch)[A-Z]").expect("Valid regex pattern"));

const HTTP_METHODS: [&str; 7] = ["get", "post", "put", "delete", "patch", "head", "options"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiFormat {
    Markdown,
    #[default]
    Html,
    #[serde(alias = "openapi_json")]
    Json,
}

impl ApiFormat {
    fn extension(self) -> &'static str {
        match self {
            ApiFormat::Markdown => "md",
            ApiFormat::Html => "html",
            ApiFormat::Json => "json",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiDocsConfig {
    pub format: ApiFormat,
    pub output_dir: String,
    #[serde(alias = "apiSpecPath")]
    pub spec_file: Option<String>,
    pub use_extracted_items: bool,
}

impl Default for ApiDocsConfig {
    fn default() -> Self {
        Self {
            format: ApiFormat::Html,
            output_dir: "./docs/api".to_string(),
            spec_file: None,
            use_extracted_items: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiSource {
    Specification,
    ExtractedItems,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiParameter {
    pub name: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "type")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub method: String,
    pub path: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ApiParameter>,
    /// Handler function and file, for endpoints found in source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiReference {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub source: String,
    pub endpoints: Vec<Endpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDocsReport {
    pub output_path: PathBuf,
    pub format: ApiFormat,
    pub source: ApiSource,
    pub endpoints: usize,
    pub size: u64,
}

fn spec_error(path: &Path, message: impl std::fmt::Display) -> EngineError {
    EngineError::validation_with_code(
        ErrorCode::VALIDATION_INVALID_INPUT,
        format!("Failed to load API specification {}: {}", path.display(), message),
        Some("specFile".to_string()),
    )
}

/// Parse an OpenAPI/Swagger-style document (JSON or YAML by extension)
pub(crate) fn parse_spec(path: &Path, content: &str) -> Result<Value> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(content).map_err(|e| spec_error(path, e)),
        Some("yaml" | "yml") => serde_yaml::from_str(content).map_err(|e| spec_error(path, e)),
        _ => Err(spec_error(
            path,
            "unsupported format (expected .json, .yaml or .yml)",
        )),
    }
}

fn text(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

pub(crate) fn reference_from_spec(spec: &Value, source: &str) -> ApiReference {
    let info = spec.get("info").cloned().unwrap_or(Value::Null);
    let mut endpoints = Vec::new();
    if let Some(paths) = spec.get("paths").and_then(Value::as_object) {
        for (path, item) in paths {
            let Some(item) = item.as_object() else { continue };
            for (method, operation) in item {
                if !HTTP_METHODS.contains(&method.as_str()) {
                    continue;
                }
                let parameters = operation
                    .get("parameters")
                    .and_then(Value::as_array)
                    .map(|params| {
                        params
                            .iter()
                            .map(|p| ApiParameter {
                                name: text(p, "name").unwrap_or_default(),
                                location: text(p, "in").unwrap_or_default(),
                                type_name: p
                                    .get("schema")
                                    .and_then(|s| text(s, "type"))
                                    .or_else(|| text(p, "type")),
                                description: text(p, "description"),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                endpoints.push(Endpoint {
                    method: method.to_uppercase(),
                    path: path.clone(),
                    summary: text(operation, "summary")
                        .or_else(|| text(operation, "description"))
                        .unwrap_or_else(|| "No summary.".to_string()),
                    parameters,
                    handler: None,
                });
            }
        }
    }
    ApiReference {
        title: text(&info, "title").unwrap_or_else(|| "API Reference".to_string()),
        version: text(&info, "version"),
        description: text(&info, "description"),
        source: source.to_string(),
        endpoints,
    }
}

/// Method and path for an extracted function that looks like an endpoint:
/// tagged `@route`/`@path`/`@endpoint`, or named like `getUsers`
pub(crate) fn endpoint_from_item(item: &DocItem) -> Option<Endpoint> {
    if item.kind != ItemKind::Function {
        return None;
    }
    let tag = item.tag(&["route", "path", "endpoint"]);
    if tag.is_none() && !HANDLER_NAME.is_match(&item.name) {
        return None;
    }
    let route = tag.map(|t| t.text()).unwrap_or_default();
    let mut words = route.split_whitespace();
    let (method, path) = match (words.next(), words.next()) {
        (Some(m), Some(p)) => (m.to_uppercase(), p.to_string()),
        (Some(p), None) if p.starts_with('/') => ("GET".to_string(), p.to_string()),
        _ => {
            let method = HANDLER_NAME
                .captures(&item.name)
                .map(|c| c[1].to_uppercase())
                .unwrap_or_else(|| "GET".to_string());
            (method, item.name.clone())
        }
    };
    Some(Endpoint {
        method,
        path,
        summary: item
            .description
            .clone()
            .unwrap_or_else(|| "No description.".to_string()),
        parameters: item
            .params
            .iter()
            .map(|p| ApiParameter {
                name: p.name.clone(),
                location: "argument".to_string(),
                type_name: p.type_name.clone(),
                description: p.description.clone(),
            })
            .collect(),
        handler: Some(format!("{} ({})", item.name, item.file_path)),
    })
}

fn render_markdown(api: &ApiReference) -> String {
    let mut out = format!("# {}\n\nSource: {}\n\n", api.title, api.source);
    if let Some(version) = &api.version {
        let _ = writeln!(out, "**Version:** {}\n", version);
    }
    if let Some(description) = &api.description {
        let _ = writeln!(out, "{}\n", description);
    }
    if api.endpoints.is_empty() {
        out.push_str("No API endpoints identified.\n");
    }
    for e in &api.endpoints {
        let _ = writeln!(out, "## `{} {}`\n\n{}\n", e.method, e.path, e.summary);
        if let Some(handler) = &e.handler {
            let _ = writeln!(out, "**Handler:** `{}`\n", handler);
        }
        if !e.parameters.is_empty() {
            out.push_str("**Parameters:**\n\n");
            for p in &e.parameters {
                let _ = writeln!(
                    out,
                    "- `{}` ({}, {}): {}",
                    p.name,
                    p.location,
                    p.type_name.as_deref().unwrap_or("any"),
                    p.description.as_deref().unwrap_or("")
                );
            }
            out.push('\n');
        }
    }
    out
}

fn render_html(api: &ApiReference) -> String {
    let mut out = format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{0}</title></head>\n<body>\n<h1>{0}</h1>\n<p>Source: {1}</p>\n",
        escape_html(&api.title),
        escape_html(&api.source)
    );
    if let Some(version) = &api.version {
        let _ = writeln!(out, "<p><strong>Version:</strong> {}</p>", escape_html(version));
    }
    if let Some(description) = &api.description {
        let _ = writeln!(out, "<p>{}</p>", escape_html(description));
    }
    if api.endpoints.is_empty() {
        out.push_str("<p>No API endpoints identified.</p>\n");
    }
    for e in &api.endpoints {
        let _ = writeln!(
            out,
            "<section>\n<h2><code>{} {}</code></h2>\n<p>{}</p>",
            escape_html(&e.method),
            escape_html(&e.path),
            escape_html(&e.summary)
        );
        if !e.parameters.is_empty() {
            out.push_str("<ul>\n");
            for p in &e.parameters {
                let _ = writeln!(
                    out,
                    "<li><code>{}</code> ({}, {}): {}</li>",
                    escape_html(&p.name),
                    escape_html(&p.location),
                    escape_html(p.type_name.as_deref().unwrap_or("any")),
                    escape_html(p.description.as_deref().unwrap_or(""))
                );
            }
            out.push_str("</ul>\n");
        }
        out.push_str("</section>\n");
    }
    out.push_str("</body>\n</html>\n");
    out
}

fn render(api: &ApiReference, format: ApiFormat) -> Result<String> {
    Ok(match format {
        ApiFormat::Markdown => render_markdown(api),
        ApiFormat::Html => render_html(api),
        ApiFormat::Json => serde_json::to_string_pretty(api)?,
    })
}

pub(super) async fn execute(
    deps: &ExecutorDeps,
    step: &PlanStep,
    context: &ExecutionContext,
) -> Result<ExecutionResult> {
    let config: ApiDocsConfig = step.data_as()?;

    let (api, source) = if let Some(spec_file) = &config.spec_file {
        let path = deps.resolve(spec_file);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| spec_error(&path, e))?;
        let spec = parse_spec(&path, &content)?;
        if spec.get("openapi").is_none() && spec.get("swagger").is_none() {
            warn!(path = %path.display(), "API specification has no openapi/swagger version field");
        }
        (reference_from_spec(&spec, spec_file), ApiSource::Specification)
    } else {
        let items = context
            .latest_extraction()
            .filter(|(result, _)| result.success)
            .map(|(_, report)| report.items.as_slice())
            .unwrap_or_default();
        if !config.use_extracted_items || items.is_empty() {
            return Ok(ExecutionResult::failed(
                ResultKind::GenerateApiDocs,
                &step.id,
                "No API specification or extracted documentation available for API docs",
            ));
        }
        let api = ApiReference {
            title: "API Reference".to_string(),
            source: "extracted code comments".to_string(),
            endpoints: items.iter().filter_map(endpoint_from_item).collect(),
            ..Default::default()
        };
        (api, ApiSource::ExtractedItems)
    };

    let content = render(&api, config.format)?;
    let output_path = deps
        .resolve(&config.output_dir)
        .join(format!("api_reference.{}", config.format.extension()));
    write_text(&output_path, &content).await?;

    info!(
        path = %output_path.display(),
        endpoints = api.endpoints.len(),
        source = ?source,
        "Wrote API reference"
    );
    let report = ApiDocsReport {
        output_path: output_path.clone(),
        format: config.format,
        source,
        endpoints: api.endpoints.len(),
        size: content.len() as u64,
    };
    let summary = format!(
        "Generated API reference with {} endpoint(s) at {}",
        report.endpoints,
        output_path.display()
    );
    Ok(ExecutionResult::succeeded(ResultKind::GenerateApiDocs, &step.id, summary)
        .with_data(ResultData::ApiDocs(report)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::cicd::test_support::deps;
    use crate::executor::documentation::source::DocTag;
    use crate::executor::documentation::DocExtractionReport;
    use crate::subprocess::MockProcessRunner;
    use serde_json::json;
    use tempfile::TempDir;

    fn function(name: &str, route: Option<&str>) -> DocItem {
        let mut item: DocItem = serde_json::from_value(json!({
            "kind": "function",
            "name": name,
            "filePath": "src/routes.ts",
            "line": 1,
            "documented": true,
            "description": format!("{} handler", name)
        }))
        .unwrap();
        if let Some(route) = route {
            let mut words = route.splitn(2, ' ');
            item.tags.push(DocTag {
                tag: "route".to_string(),
                name: words.next().map(str::to_string),
                description: words.next().map(str::to_string),
                ..Default::default()
            });
        }
        item
    }

    #[test]
    fn test_endpoint_detection() {
        let tagged = endpoint_from_item(&function("listAll", Some("POST /items"))).unwrap();
        assert_eq!((tagged.method.as_str(), tagged.path.as_str()), ("POST", "/items"));

        let named = endpoint_from_item(&function("deleteUser", None)).unwrap();
        assert_eq!(named.method, "DELETE");
        assert_eq!(named.path, "deleteUser");

        assert!(endpoint_from_item(&function("render", None)).is_none());
        assert!(endpoint_from_item(&function("getter", None)).is_none());
    }

    #[test]
    fn test_reference_from_yaml_spec() {
        let yaml = "openapi: 3.0.0\ninfo:\n  title: Pets\n  version: '1.0'\npaths:\n  /pets:\n    parameters: []\n    get:\n      summary: List pets\n      parameters:\n        - name: limit\n          in: query\n          schema:\n            type: integer\n";
        let spec = parse_spec(Path::new("api.yaml"), yaml).unwrap();
        let api = reference_from_spec(&spec, "api.yaml");
        assert_eq!(api.title, "Pets");
        assert_eq!(api.version.as_deref(), Some("1.0"));
        assert_eq!(api.endpoints.len(), 1);
        assert_eq!(api.endpoints[0].method, "GET");
        assert_eq!(api.endpoints[0].parameters[0].type_name.as_deref(), Some("integer"));

        assert!(parse_spec(Path::new("api.txt"), "").is_err());
    }

    #[tokio::test]
    async fn test_markdown_from_extracted_items() {
        let tmp = TempDir::new().unwrap();
        let deps = deps(&MockProcessRunner::new(), json!({}), tmp.path());
        let mut ctx = ExecutionContext::new();
        ctx.record(
            ExecutionResult::succeeded(ResultKind::ExtractDocumentation, "extract", "ok").with_data(
                ResultData::DocExtraction(DocExtractionReport {
                    items: vec![function("getUsers", None), function("helper", None)],
                    ..Default::default()
                }),
            ),
        )
        .unwrap();
        let step = PlanStep::new("api-docs", 5, "API docs")
            .with_data(json!({ "format": "markdown", "outputDir": "docs/api" }));

        let result = execute(&deps, &step, &ctx).await.unwrap();
        assert!(result.success);
        let written = std::fs::read_to_string(tmp.path().join("docs/api/api_reference.md")).unwrap();
        assert!(written.contains("## `GET getUsers`"));
        assert!(!written.contains("helper"));
    }

    #[tokio::test]
    async fn test_html_from_spec_file() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("openapi.json"),
            json!({
                "openapi": "3.0.0",
                "info": { "title": "Orders <v2>" },
                "paths": { "/orders": { "post": { "description": "Create" } } }
            })
            .to_string(),
        )
        .unwrap();
        let deps = deps(&MockProcessRunner::new(), json!({}), tmp.path());
        let step = PlanStep::new("api-docs", 5, "API docs").with_data(json!({ "specFile": "openapi.json" }));

        let result = execute(&deps, &step, &ExecutionContext::new()).await.unwrap();
        let ResultData::ApiDocs(report) = result.data else {
            panic!("expected api docs payload");
        };
        assert_eq!(report.source, ApiSource::Specification);
        assert_eq!(report.endpoints, 1);
        let html = std::fs::read_to_string(tmp.path().join("docs/api/api_reference.html")).unwrap();
        assert!(html.contains("Orders &lt;v2&gt;"));
        assert!(html.contains("<code>POST &#x2F;orders</code>"));
    }

    #[tokio::test]
    async fn test_nothing_to_document() {
        let tmp = TempDir::new().unwrap();
        let deps = deps(&MockProcessRunner::new(), json!({}), tmp.path());
        let result = execute(&deps, &PlanStep::new("api-docs", 5, "API docs"), &ExecutionContext::new())
            .await
            .unwrap();
        assert!(!result.success);
    }
}
