use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::analyze::AnalyzedFile;
use super::source::{DocParam, DocTag, ElementKind, SourceElement};
use crate::error::Result;
use crate::plan::{ExecutionContext, ExecutionResult, PlanStep, ResultData, ResultKind};

/// A doc block is attached to a symbol declared at most this many lines below its end
const ASSOCIATION_WINDOW: usize = 5;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractConfig {
    /// Also extract from files the analysis judged sufficiently documented
    pub force_extract_all: bool,
    /// Keep `@example` tags on extracted items
    pub extract_examples: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            force_extract_all: false,
            extract_examples: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Function,
    Class,
    Interface,
    CommentBlock,
    Todo,
    FilePlaceholder,
}

impl From<ElementKind> for ItemKind {
    fn from(kind: ElementKind) -> Self {
        match kind {
            ElementKind::Class => ItemKind::Class,
            ElementKind::Interface => ItemKind::Interface,
            ElementKind::Todo => ItemKind::Todo,
            ElementKind::Function => ItemKind::Function,
            ElementKind::DocBlock | ElementKind::Export => ItemKind::CommentBlock,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocReturn {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocItem {
    pub kind: ItemKind,
    pub name: String,
    pub file_path: String,
    pub line: usize,
    /// False for symbols with no doc block, TODOs and placeholders
    pub documented: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<DocParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<DocReturn>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<DocTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl DocItem {
    fn bare(kind: ItemKind, name: String, file_path: &str, line: usize) -> Self {
        Self {
            kind,
            name,
            file_path: file_path.to_string(),
            line,
            documented: false,
            description: None,
            params: Vec::new(),
            returns: None,
            tags: Vec::new(),
            extends: None,
            raw: None,
        }
    }

    pub fn tag(&self, names: &[&str]) -> Option<&DocTag> {
        self.tags.iter().find(|t| names.contains(&t.tag.as_str()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocExtractionReport {
    pub items: Vec<DocItem>,
    pub files_processed: usize,
    pub undocumented_symbols: usize,
    pub todos: usize,
}

/// Merge tag-level parameter docs into the declared signature
fn merge_params(declared: &[DocParam], tags: &[DocTag]) -> Vec<DocParam> {
    let tagged: Vec<DocParam> = tags
        .iter()
        .filter(|t| t.tag == "param")
        .filter_map(|t| {
            Some(DocParam {
                name: t.name.clone()?,
                type_name: t.type_name.clone(),
                description: t.description.clone(),
                ..Default::default()
            })
        })
        .collect();
    if declared.is_empty() {
        return tagged;
    }
    declared
        .iter()
        .map(|p| {
            let doc = tagged.iter().find(|t| t.name == p.name);
            DocParam {
                type_name: p
                    .type_name
                    .clone()
                    .or_else(|| doc.and_then(|d| d.type_name.clone())),
                description: doc.and_then(|d| d.description.clone()),
                ..p.clone()
            }
        })
        .collect()
}

fn documented_item(
    file: &str,
    doc: &SourceElement,
    symbol: Option<&SourceElement>,
    keep_examples: bool,
) -> DocItem {
    let tags: Vec<DocTag> = doc
        .tags
        .iter()
        .filter(|t| keep_examples || t.tag != "example")
        .cloned()
        .collect();
    let returns = tags
        .iter()
        .find(|t| t.tag == "returns" || t.tag == "return")
        .map(|t| DocReturn {
            type_name: t.type_name.clone(),
            description: non_empty_text(t),
        })
        .or_else(|| {
            symbol
                .and_then(|s| s.return_type.clone())
                .map(|ty| DocReturn {
                    type_name: Some(ty),
                    description: None,
                })
        });

    let (kind, name) = match symbol {
        Some(s) => (
            ItemKind::from(s.kind),
            s.name.clone().unwrap_or_default(),
        ),
        None => (ItemKind::CommentBlock, format!("doc_block_L{}", doc.line)),
    };
    DocItem {
        documented: true,
        description: doc.description.clone(),
        params: merge_params(symbol.map_or(&[][..], |s| &s.params), &tags),
        returns,
        extends: symbol.and_then(|s| s.extends.clone()),
        raw: doc.raw.clone(),
        tags,
        ..DocItem::bare(kind, name, file, doc.line)
    }
}

fn non_empty_text(tag: &DocTag) -> Option<String> {
    let text = tag.text();
    (!text.is_empty()).then_some(text)
}

/// Items for one analyzed file: documented symbols first, then undocumented
/// symbols, then TODOs
pub(crate) fn extract_file(file: &AnalyzedFile, keep_examples: bool) -> Vec<DocItem> {
    let symbols: Vec<&SourceElement> = file.elements.iter().filter(|e| e.kind.is_symbol()).collect();
    let mut items = Vec::new();
    let mut attached: Vec<&str> = Vec::new();

    for doc in file.elements.iter().filter(|e| e.kind == ElementKind::DocBlock) {
        let symbol = symbols
            .iter()
            .copied()
            .filter(|s| s.line > doc.end_line && s.line <= doc.end_line + ASSOCIATION_WINDOW)
            .min_by_key(|s| s.line);
        if let Some(name) = symbol.and_then(|s| s.name.as_deref()) {
            attached.push(name);
        }
        items.push(documented_item(&file.path, doc, symbol, keep_examples));
    }

    for symbol in &symbols {
        let name = symbol.name.clone().unwrap_or_default();
        if attached.contains(&name.as_str()) {
            continue;
        }
        items.push(DocItem {
            description: Some("No doc comment found".to_string()),
            params: symbol.params.clone(),
            returns: symbol.return_type.clone().map(|ty| DocReturn {
                type_name: Some(ty),
                description: None,
            }),
            extends: symbol.extends.clone(),
            ..DocItem::bare(ItemKind::from(symbol.kind), name, &file.path, symbol.line)
        });
    }

    for todo in file.elements.iter().filter(|e| e.kind == ElementKind::Todo) {
        items.push(DocItem {
            description: todo.description.clone(),
            ..DocItem::bare(
                ItemKind::Todo,
                format!("todo_L{}", todo.line),
                &file.path,
                todo.line,
            )
        });
    }

    if file.elements.is_empty() && file.needs_documentation {
        items.push(DocItem {
            description: Some(
                "File marked for documentation, but no elements were found".to_string(),
            ),
            ..DocItem::bare(ItemKind::FilePlaceholder, file.path.clone(), &file.path, 0)
        });
    }
    items
}

pub(super) fn execute(step: &PlanStep, context: &ExecutionContext) -> Result<ExecutionResult> {
    let config: ExtractConfig = step.data_as()?;
    let analysis = match context.latest_doc_analysis() {
        Some((result, report)) if result.success => report,
        _ => {
            return Ok(ExecutionResult::failed(
                ResultKind::ExtractDocumentation,
                &step.id,
                "No codebase analysis available for documentation extraction",
            ))
        }
    };

    let mut report = DocExtractionReport::default();
    for file in &analysis.files {
        if !file.needs_documentation && !config.force_extract_all {
            debug!(path = %file.path, "Skipping sufficiently documented file");
            continue;
        }
        report.files_processed += 1;
        report
            .items
            .extend(extract_file(file, config.extract_examples));
    }
    report.undocumented_symbols = report
        .items
        .iter()
        .filter(|i| !i.documented && matches!(i.kind, ItemKind::Function | ItemKind::Class | ItemKind::Interface))
        .count();
    report.todos = report.items.iter().filter(|i| i.kind == ItemKind::Todo).count();

    info!(
        files = report.files_processed,
        items = report.items.len(),
        undocumented = report.undocumented_symbols,
        "Documentation extraction finished"
    );
    let summary = format!(
        "Processed {} file(s) and extracted {} documentation item(s)",
        report.files_processed,
        report.items.len()
    );
    Ok(
        ExecutionResult::succeeded(ResultKind::ExtractDocumentation, &step.id, summary)
            .with_data(ResultData::DocExtraction(report)),
    )
}
