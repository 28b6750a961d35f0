use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tera::{Context, Tera};
use tracing::{debug, error, info};

use super::extract::DocItem;
use crate::error::{EngineError, ErrorCode, Result};
use crate::executor::common::write_text;
use crate::executor::ExecutorDeps;
use crate::plan::{ExecutionContext, ExecutionResult, PlanStep, ResultData, ResultKind};

static UNSAFE_FILE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9_.-]").expect("Valid regex pattern"));

const MARKDOWN_TEMPLATE: &str = r#"---
sourceFile: {{ source_file }}
generatedAt: {{ generated_at }}
format: markdown
---
# Documentation for {{ source_file }}
{% for item in items %}
## `{{ item.name }}` ({{ item.kind }})

{{ item.description }}
{% if item.params %}
### Parameters

| Name | Type | Optional | Default | Description |
|------|------|----------|---------|-------------|
{% for p in item.params -%}
| `{{ p.name }}` | `{{ p.type_name }}` | {% if p.optional %}Yes{% else %}No{% endif %} | {{ p.default }} | {{ p.description }} |
{% endfor -%}
{% endif -%}
{% if item.return_type %}
### Returns

**Type:** `{{ item.return_type }}`

{{ item.return_description }}
{% endif -%}
{% if item.tags %}
### Other Tags

{% for tag in item.tags -%}
- {{ tag }}
{% endfor -%}
{% endif -%}
{% if item.raw %}
<details>
<summary>Raw doc comment</summary>

```
{{ item.raw }}
```

</details>
{% endif %}
---
{% endfor %}"#;

const HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Docs for {{ source_file }}</title>
<style>body{font-family:sans-serif;margin:20px}table{border-collapse:collapse;width:100%}th,td{border:1px solid #ddd;padding:8px;text-align:left}th{background:#f2f2f2}</style>
</head>
<body>
<h1>Documentation for {{ source_file }}</h1>
{% for item in items -%}
<div>
<h2><code>{{ item.name }}</code> ({{ item.kind }})</h2>
<p>{{ item.description }}</p>
{% if item.params -%}
<h3>Parameters</h3>
<table>
<tr><th>Name</th><th>Type</th><th>Optional</th><th>Default</th><th>Description</th></tr>
{% for p in item.params -%}
<tr><td><code>{{ p.name }}</code></td><td><code>{{ p.type_name }}</code></td><td>{% if p.optional %}Yes{% else %}No{% endif %}</td><td>{{ p.default }}</td><td>{{ p.description }}</td></tr>
{% endfor -%}
</table>
{% endif -%}
{% if item.return_type -%}
<h3>Returns</h3>
<p><strong>Type:</strong> <code>{{ item.return_type }}</code></p>
<p>{{ item.return_description }}</p>
{% endif -%}
</div>
<hr/>
{% endfor -%}
</body>
</html>
"#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocFormat {
    #[default]
    Markdown,
    Html,
    Json,
}

impl DocFormat {
    pub fn extension(self) -> &'static str {
        match self {
            DocFormat::Markdown => "md",
            DocFormat::Html => "html",
            DocFormat::Json => "json",
        }
    }

    fn template_name(self) -> &'static str {
        match self {
            DocFormat::Markdown => "doc.md",
            DocFormat::Html => "doc.html",
            DocFormat::Json => "doc.json",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateConfig {
    pub format: DocFormat,
    pub output_dir: String,
    /// Directory holding `doc.md` / `doc.html` templates that replace the built-in ones
    pub templates: Option<String>,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            format: DocFormat::Markdown,
            output_dir: "./docs".to_string(),
            templates: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedDoc {
    pub source_file: String,
    pub output_path: PathBuf,
    pub size: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocGenerationReport {
    pub files: Vec<GeneratedDoc>,
    pub format: DocFormat,
    pub output_dir: PathBuf,
}

impl DocGenerationReport {
    pub fn written(&self) -> impl Iterator<Item = &GeneratedDoc> {
        self.files.iter().filter(|f| f.success)
    }
}

/// Template-facing view of an item with every optional field filled in
#[derive(Serialize)]
struct RenderItem {
    name: String,
    kind: String,
    description: String,
    params: Vec<RenderParam>,
    return_type: String,
    return_description: String,
    tags: Vec<String>,
    raw: String,
}

#[derive(Serialize)]
struct RenderParam {
    name: String,
    type_name: String,
    optional: bool,
    default: String,
    description: String,
}

impl From<&DocItem> for RenderItem {
    fn from(item: &DocItem) -> Self {
        let kind = serde_json::to_value(item.kind)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let tags = item
            .tags
            .iter()
            .filter(|t| !matches!(t.tag.as_str(), "param" | "returns" | "return" | "description"))
            .map(|t| match &t.type_name {
                Some(ty) => format!("**@{}** {{{}}} {}", t.tag, ty, t.text()),
                None => format!("**@{}** {}", t.tag, t.text()),
            })
            .map(|s| s.trim_end().to_string())
            .collect();
        let returns = item.returns.as_ref();
        Self {
            name: item.name.clone(),
            kind,
            description: item
                .description
                .clone()
                .unwrap_or_else(|| "No description available.".to_string()),
            params: item
                .params
                .iter()
                .map(|p| RenderParam {
                    name: p.name.clone(),
                    type_name: p.type_name.clone().unwrap_or_else(|| "any".to_string()),
                    optional: p.optional,
                    default: p.default.clone().unwrap_or_else(|| "-".to_string()),
                    description: p
                        .description
                        .clone()
                        .unwrap_or_else(|| "No description.".to_string()),
                })
                .collect(),
            return_type: returns
                .map(|r| r.type_name.clone().unwrap_or_else(|| "any".to_string()))
                .unwrap_or_default(),
            return_description: returns
                .and_then(|r| r.description.clone())
                .unwrap_or_default(),
            tags,
            raw: item.raw.clone().unwrap_or_default(),
        }
    }
}

/// File name for a source path: unsafe characters become `_`
pub fn safe_file_name(source: &str) -> String {
    UNSAFE_FILE_CHARS.replace_all(source, "_").into_owned()
}

pub(crate) struct DocRenderer {
    tera: Tera,
}

impl DocRenderer {
    /// Built-in templates, optionally overridden by files in `template_dir`
    pub(crate) fn new(template_dir: Option<&Path>) -> Result<Self> {
        let mut tera = Tera::default();
        let mut markdown = MARKDOWN_TEMPLATE.to_string();
        let mut html = HTML_TEMPLATE.to_string();
        if let Some(dir) = template_dir {
            if let Ok(custom) = std::fs::read_to_string(dir.join("doc.md")) {
                markdown = custom;
            }
            if let Ok(custom) = std::fs::read_to_string(dir.join("doc.html")) {
                html = custom;
            }
        }
        tera.add_raw_templates(vec![("doc.md", markdown), ("doc.html", html)])
            .map_err(|e| {
                EngineError::config_with_code(
                    ErrorCode::CONFIG_INVALID_VALUE,
                    format!("Invalid documentation template: {}", e),
                )
            })?;
        Ok(Self { tera })
    }

    pub(crate) fn render(&self, format: DocFormat, source: &str, items: &[&DocItem]) -> Result<String> {
        if format == DocFormat::Json {
            return Ok(serde_json::to_string_pretty(items)?);
        }
        let mut context = Context::new();
        context.insert("source_file", source);
        context.insert("generated_at", &chrono::Utc::now().to_rfc3339());
        let view: Vec<RenderItem> = items.iter().map(|i| RenderItem::from(*i)).collect();
        context.insert("items", &view);
        self.tera.render(format.template_name(), &context).map_err(|e| {
            EngineError::execution_with_code(
                ErrorCode::EXEC_GENERIC,
                format!("Template rendering failed for {}: {}", source, e),
                None,
            )
        })
    }
}

/// Items grouped by source file, in first-seen order
fn by_file(items: &[DocItem]) -> Vec<(&str, Vec<&DocItem>)> {
    let mut groups: Vec<(&str, Vec<&DocItem>)> = Vec::new();
    for item in items {
        match groups.iter_mut().find(|(f, _)| *f == item.file_path) {
            Some((_, list)) => list.push(item),
            None => groups.push((&item.file_path, vec![item])),
        }
    }
    groups
}

pub(super) async fn execute(
    deps: &ExecutorDeps,
    step: &PlanStep,
    context: &ExecutionContext,
) -> Result<ExecutionResult> {
    let config: GenerateConfig = step.data_as()?;
    let items = match context.latest_extraction() {
        Some((result, report)) if result.success && !report.items.is_empty() => &report.items,
        _ => {
            return Ok(ExecutionResult::failed(
                ResultKind::GenerateDocumentation,
                &step.id,
                "No extracted documentation items available for generation",
            ))
        }
    };

    let output_dir = deps.resolve(&config.output_dir);
    let template_dir = config.templates.as_ref().map(|t| deps.resolve(t));
    let renderer = DocRenderer::new(template_dir.as_deref())?;
    info!(format = ?config.format, output_dir = %output_dir.display(), "Generating documentation");

    let mut report = DocGenerationReport {
        format: config.format,
        output_dir: output_dir.clone(),
        ..Default::default()
    };
    for (source, group) in by_file(items) {
        let output_path = output_dir.join(format!(
            "{}.{}",
            safe_file_name(source),
            config.format.extension()
        ));
        let written = match renderer.render(config.format, source, &group) {
            Ok(content) => write_text(&output_path, &content)
                .await
                .map(|_| content.len() as u64),
            Err(e) => Err(e),
        };
        let doc = match written {
            Ok(size) => {
                debug!(source, path = %output_path.display(), size, "Wrote documentation file");
                GeneratedDoc {
                    source_file: source.to_string(),
                    output_path,
                    size,
                    success: true,
                    error: None,
                }
            }
            Err(e) => {
                error!(source, error = %e, "Failed to write documentation file");
                GeneratedDoc {
                    source_file: source.to_string(),
                    output_path,
                    size: 0,
                    success: false,
                    error: Some(e.user_message()),
                }
            }
        };
        report.files.push(doc);
    }

    let written = report.written().count();
    let result = ExecutionResult::from_outcome(
        ResultKind::GenerateDocumentation,
        &step.id,
        written > 0,
        if written > 0 {
            format!(
                "Generated {} documentation file(s) in {} format to {}",
                written,
                config.format.extension(),
                output_dir.display()
            )
        } else {
            "No documentation files could be written".to_string()
        },
    );
    Ok(result.with_data(ResultData::DocGeneration(report)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::cicd::test_support::deps;
    use crate::executor::documentation::extract::{DocReturn, ItemKind};
    use crate::executor::documentation::source::{DocParam, DocTag};
    use crate::executor::documentation::DocExtractionReport;
    use crate::subprocess::MockProcessRunner;
    use serde_json::json;
    use tempfile::TempDir;

    fn item(file: &str, name: &str) -> DocItem {
        DocItem {
            kind: ItemKind::Function,
            name: name.to_string(),
            file_path: file.to_string(),
            line: 3,
            documented: true,
            description: Some(format!("Does {} things.", name)),
            params: vec![DocParam {
                name: "id".to_string(),
                type_name: Some("string".to_string()),
                ..Default::default()
            }],
            returns: Some(DocReturn {
                type_name: Some("User".to_string()),
                description: None,
            }),
            tags: vec![DocTag {
                tag: "since".to_string(),
                name: Some("1.2".to_string()),
                ..Default::default()
            }],
            extends: None,
            raw: None,
        }
    }

    fn context(items: Vec<DocItem>) -> ExecutionContext {
        let mut ctx = ExecutionContext::new();
        ctx.record(
            ExecutionResult::succeeded(ResultKind::ExtractDocumentation, "extract", "ok")
                .with_data(ResultData::DocExtraction(DocExtractionReport {
                    items,
                    ..Default::default()
                })),
        )
        .unwrap();
        ctx
    }

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("src/api/users.ts"), "src_api_users.ts");
        assert_eq!(safe_file_name("a b+c.js"), "a_b_c.js");
    }

    #[test]
    fn test_markdown_rendering() {
        let renderer = DocRenderer::new(None).unwrap();
        let user = item("src/user.ts", "getUser");
        let md = renderer.render(DocFormat::Markdown, "src/user.ts", &[&user]).unwrap();
        assert!(md.contains("# Documentation for src/user.ts"));
        assert!(md.contains("## `getUser` (function)"));
        assert!(md.contains("| `id` | `string` | No | - | No description. |"));
        assert!(md.contains("**Type:** `User`"));
        assert!(md.contains("- **@since** 1.2"));
    }

    #[test]
    fn test_html_rendering_escapes() {
        let renderer = DocRenderer::new(None).unwrap();
        let mut generic = item("a.ts", "wrap");
        generic.description = Some("Returns <T> unchanged".to_string());
        let html = renderer.render(DocFormat::Html, "a.ts", &[&generic]).unwrap();
        assert!(html.contains("Returns &lt;T&gt; unchanged"));
        assert!(html.contains("<h2><code>wrap</code> (function)</h2>"));
    }

    #[tokio::test]
    async fn test_one_file_per_source() {
        let tmp = TempDir::new().unwrap();
        let deps = deps(&MockProcessRunner::new(), json!({}), tmp.path());
        let ctx = context(vec![
            item("src/a.ts", "one"),
            item("src/b.ts", "two"),
            item("src/a.ts", "three"),
        ]);
        let step = PlanStep::new("generate", 3, "Generate")
            .with_data(json!({ "format": "json", "outputDir": "docs" }));

        let result = execute(&deps, &step, &ctx).await.unwrap();
        assert!(result.success);
        let ResultData::DocGeneration(report) = result.data else {
            panic!("expected generation payload");
        };
        assert_eq!(report.files.len(), 2);
        let a: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(tmp.path().join("docs/src_a.ts.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(a.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_requires_extracted_items() {
        let tmp = TempDir::new().unwrap();
        let deps = deps(&MockProcessRunner::new(), json!({}), tmp.path());
        let result = execute(&deps, &PlanStep::new("generate", 3, "Generate"), &context(vec![]))
            .await
            .unwrap();
        assert!(!result.success);
    }
}
