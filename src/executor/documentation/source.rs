//! Regex-level scanning of JavaScript/TypeScript sources for doc comments
//! and declared symbols. This is a heuristic, not a parser.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static DOC_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*\*(.*?)\*/").expect("Valid regex pattern"));
static TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@(\w+)\s*(?:\{([^}]+)\})?\s*([A-Za-z0-9_$.\[\]/]+)?\s*(.*)$")
        .expect("Valid regex pattern")
});
static TODO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)//\s*TODO[:\s](.*)").expect("Valid regex pattern"));
static FUNCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(async\s+)?function\s+([A-Za-z0-9_]+)\s*\(([^)]*)\)\s*(?::\s*([^{;=]*?)\s*)?(?:\{|=>)",
    )
    .expect("Valid regex pattern")
});
static CLASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"class\s+([A-Za-z0-9_]+)(?:\s+extends\s+([A-Za-z0-9_<>,\s]+?))?\s*\{")
        .expect("Valid regex pattern")
});
static INTERFACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"interface\s+([A-Za-z0-9_]+)[^{]*\{").expect("Valid regex pattern"));
static EXPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"export\s+(?:default\s+)?(?:async\s+)?(const|let|var|function|class|interface|type|enum)\s+([A-Za-z0-9_]+)",
    )
    .expect("Valid regex pattern")
});

/// Doc blocks shorter than this are not counted as documentation
const MIN_DOC_LENGTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    DocBlock,
    Function,
    Class,
    Interface,
    Export,
    Todo,
}

impl ElementKind {
    pub fn is_symbol(self) -> bool {
        matches!(
            self,
            ElementKind::Function | ElementKind::Class | ElementKind::Interface
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocTag {
    pub tag: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DocTag {
    /// Name and description joined, as written after the type
    pub fn text(&self) -> String {
        [self.name.as_deref(), self.description.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocParam {
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One thing found in a source file. Which fields are set depends on `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceElement {
    pub kind: ElementKind,
    /// 1-based line of the match start
    pub line: usize,
    /// Last line the match spans; equal to `line` for one-line matches
    #[serde(default)]
    pub end_line: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Comment text; for exports, the declaration keyword (`const`, `class`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<DocTag>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<DocParam>,
    #[serde(default)]
    pub is_async: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl SourceElement {
    fn new(kind: ElementKind, line: usize) -> Self {
        Self {
            kind,
            line,
            end_line: line,
            name: None,
            description: None,
            tags: Vec::new(),
            params: Vec::new(),
            is_async: false,
            return_type: None,
            extends: None,
            raw: None,
        }
    }

    fn named(kind: ElementKind, line: usize, name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::new(kind, line)
        }
    }
}

fn line_of(content: &str, offset: usize) -> usize {
    content[..offset].matches('\n').count() + 1
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Comment body with the leading `*` of each line removed
fn comment_lines(body: &str) -> Vec<&str> {
    body.lines()
        .map(|l| {
            let l = l.trim();
            l.strip_prefix('*').map(str::trim_start).unwrap_or(l)
        })
        .collect()
}

pub(crate) fn parse_doc_block(body: &str) -> (Option<String>, Vec<DocTag>) {
    let lines = comment_lines(body);
    let mut description = Vec::new();
    let mut tags: Vec<DocTag> = Vec::new();
    for line in lines {
        if let Some(caps) = TAG.captures(line) {
            tags.push(DocTag {
                tag: caps[1].to_string(),
                type_name: caps.get(2).and_then(|m| non_empty(m.as_str())),
                name: caps.get(3).and_then(|m| non_empty(m.as_str())),
                description: caps
                    .get(4)
                    .and_then(|m| non_empty(m.as_str().trim_start_matches('-'))),
            });
        } else if let Some(last) = tags.last_mut() {
            // continuation of the previous tag
            if let Some(more) = non_empty(line) {
                let joined = match last.description.take() {
                    Some(d) => format!("{} {}", d, more),
                    None => more,
                };
                last.description = Some(joined);
            }
        } else if !line.is_empty() {
            description.push(line);
        }
    }
    (non_empty(&description.join(" ")), tags)
}

pub(crate) fn parse_params(list: &str) -> Vec<DocParam> {
    list.split(',')
        .filter_map(|part| {
            let part = part.trim();
            let (decl, default) = match part.split_once('=') {
                Some((d, v)) => (d.trim(), non_empty(v)),
                None => (part, None),
            };
            let (name, type_name) = match decl.split_once(':') {
                Some((n, t)) => (n.trim(), non_empty(t)),
                None => (decl, None),
            };
            let optional = name.ends_with('?') || default.is_some();
            let name = name.trim_end_matches('?').trim();
            (!name.is_empty()).then(|| DocParam {
                name: name.to_string(),
                type_name,
                optional,
                default,
                description: None,
            })
        })
        .collect()
}

/// Every doc block, TODO, function, class, interface and export in `content`,
/// grouped by kind in that order
pub fn scan(content: &str) -> Vec<SourceElement> {
    let mut elements = Vec::new();

    for caps in DOC_BLOCK.captures_iter(content) {
        let (start, end) = caps.get(0).map_or((0, 0), |m| (m.start(), m.end()));
        let body = caps[1].trim();
        let (description, tags) = parse_doc_block(body);
        elements.push(SourceElement {
            description,
            tags,
            raw: Some(body.to_string()),
            end_line: line_of(content, end),
            ..SourceElement::new(ElementKind::DocBlock, line_of(content, start))
        });
    }
    for caps in TODO.captures_iter(content) {
        let start = caps.get(0).map_or(0, |m| m.start());
        elements.push(SourceElement {
            description: non_empty(&caps[1]),
            ..SourceElement::new(ElementKind::Todo, line_of(content, start))
        });
    }
    for caps in FUNCTION.captures_iter(content) {
        let start = caps.get(0).map_or(0, |m| m.start());
        elements.push(SourceElement {
            is_async: caps.get(1).is_some(),
            params: parse_params(&caps[3]),
            return_type: caps.get(4).and_then(|m| non_empty(m.as_str())),
            ..SourceElement::named(ElementKind::Function, line_of(content, start), &caps[2])
        });
    }
    for caps in CLASS.captures_iter(content) {
        let start = caps.get(0).map_or(0, |m| m.start());
        elements.push(SourceElement {
            extends: caps.get(2).and_then(|m| non_empty(m.as_str())),
            ..SourceElement::named(ElementKind::Class, line_of(content, start), &caps[1])
        });
    }
    for caps in INTERFACE.captures_iter(content) {
        let start = caps.get(0).map_or(0, |m| m.start());
        elements.push(SourceElement::named(
            ElementKind::Interface,
            line_of(content, start),
            &caps[1],
        ));
    }
    for caps in EXPORT.captures_iter(content) {
        let start = caps.get(0).map_or(0, |m| m.start());
        elements.push(SourceElement {
            description: Some(caps[1].to_string()),
            ..SourceElement::named(ElementKind::Export, line_of(content, start), &caps[2])
        });
    }
    elements
}

/// Estimated documentation coverage of a file in `[0, 1]`:
/// files exporting nothing count as covered, a TODO asking for documentation
/// counts as nearly uncovered, otherwise substantial doc blocks per export.
pub fn estimate_coverage(elements: &[SourceElement]) -> f64 {
    let exports = elements
        .iter()
        .filter(|e| e.kind == ElementKind::Export)
        .count();
    if exports == 0 {
        return 1.0;
    }
    let doc_todo = elements.iter().any(|e| {
        e.kind == ElementKind::Todo
            && e.description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains("document"))
    });
    if doc_todo {
        return 0.1;
    }
    let documented = elements
        .iter()
        .filter(|e| e.kind == ElementKind::DocBlock)
        .filter(|e| e.description.as_deref().is_some_and(|d| d.len() > MIN_DOC_LENGTH))
        .count();
    let coverage = (documented as f64 / exports as f64).min(1.0);
    (coverage * 100.0).round() / 100.0
}
