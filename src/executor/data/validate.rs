use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::info;

use crate::error::{EngineError, ErrorCode, Result};
use crate::plan::{ExecutionContext, ExecutionResult, PlanStep, ResultData, ResultKind};

/// Issues kept per report; counts always cover every record
const MAX_REPORTED_ISSUES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Any invalid record fails the step
    #[default]
    Strict,
    /// Tolerates an invalid rate up to `maxInvalidRate`
    Relaxed,
}

/// A per-field check applied when the field is present
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyRule {
    pub field: String,
    #[serde(rename = "type")]
    pub value_type: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub pattern: Option<String>,
    #[serde(alias = "allowed")]
    pub allowed_values: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidateConfig {
    pub validate_schema: bool,
    pub check_completeness: bool,
    pub check_consistency: bool,
    pub check_completeness_fields: Vec<String>,
    pub rules: Vec<ConsistencyRule>,
    pub schema: Option<Value>,
    pub mode: ValidationMode,
    pub max_invalid_rate: f64,
}

impl Default for ValidateConfig {
    fn default() -> Self {
        Self {
            validate_schema: true,
            check_completeness: true,
            check_consistency: true,
            check_completeness_fields: Vec::new(),
            rules: Vec::new(),
            schema: None,
            mode: ValidationMode::Strict,
            max_invalid_rate: 0.1,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordIssue {
    pub index: usize,
    pub problems: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateReport {
    pub valid_records: Vec<Value>,
    pub total_checked: usize,
    pub invalid_count: usize,
    pub schema_violations: usize,
    pub incompleteness_violations: usize,
    pub consistency_violations: usize,
    pub invalid_rate: f64,
    /// Invalid rate applied to the full collected set when only a sample was checked
    pub estimated_invalid_total: Option<usize>,
    pub mode: ValidationMode,
    pub issues: Vec<RecordIssue>,
}

fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn has_type(value: &Value, expected: &str) -> bool {
    match expected {
        // Integers are numbers too
        "number" => value.is_number(),
        "integer" => value.as_f64().is_some_and(|f| f.fract() == 0.0),
        other => type_name(value) == other,
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| {
        EngineError::validation_with_code(
            ErrorCode::VALIDATION_INVALID_INPUT,
            format!("Invalid pattern '{}'", pattern),
            Some("pattern".to_string()),
        )
        .with_source(e)
    })
}

/// Regexes for every `pattern` in the rules and schema, compiled once
struct Patterns(HashMap<String, Regex>);

impl Patterns {
    fn build(rules: &[ConsistencyRule], schema: Option<&Value>) -> Result<Self> {
        let mut map = HashMap::new();
        for pattern in rules.iter().filter_map(|r| r.pattern.as_deref()) {
            map.insert(pattern.to_string(), compile(pattern)?);
        }
        if let Some(schema) = schema {
            Self::from_schema(schema, &mut map)?;
        }
        Ok(Self(map))
    }

    fn from_schema(schema: &Value, map: &mut HashMap<String, Regex>) -> Result<()> {
        if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
            map.insert(pattern.to_string(), compile(pattern)?);
        }
        if let Some(props) = schema.get("properties").and_then(Value::as_object) {
            for sub in props.values() {
                Self::from_schema(sub, map)?;
            }
        }
        if let Some(items) = schema.get("items") {
            Self::from_schema(items, map)?;
        }
        Ok(())
    }

    fn matches(&self, pattern: &str, text: &str) -> bool {
        self.0.get(pattern).map_or(true, |re| re.is_match(text))
    }
}

fn check_rule(rule: &ConsistencyRule, value: &Value, patterns: &Patterns, out: &mut Vec<String>) {
    let field = &rule.field;
    if let Some(expected) = &rule.value_type {
        if !has_type(value, expected) {
            out.push(format!("{}: expected {}, found {}", field, expected, type_name(value)));
            return;
        }
    }
    if let Some(n) = value.as_f64() {
        if let Some(min) = rule.min.filter(|min| n < *min) {
            out.push(format!("{}: {} is below minimum {}", field, n, min));
        }
        if let Some(max) = rule.max.filter(|max| n > *max) {
            out.push(format!("{}: {} is above maximum {}", field, n, max));
        }
    }
    if let (Some(pattern), Some(text)) = (&rule.pattern, value.as_str()) {
        if !patterns.matches(pattern, text) {
            out.push(format!("{}: '{}' does not match {}", field, text, pattern));
        }
    }
    if let Some(allowed) = &rule.allowed_values {
        if !allowed.contains(value) {
            out.push(format!("{}: {} is not an allowed value", field, value));
        }
    }
}

/// JSON-schema subset: type, required, properties, items, enum, minimum,
/// maximum, minLength, maxLength, pattern
fn check_schema(value: &Value, schema: &Value, path: &str, patterns: &Patterns, out: &mut Vec<String>) {
    let at = if path.is_empty() { "record" } else { path };

    if let Some(expected) = schema.get("type") {
        let allowed: Vec<&str> = match expected {
            Value::String(s) => vec![s.as_str()],
            Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| has_type(value, t)) {
            out.push(format!("{}: expected {}, found {}", at, allowed.join("|"), type_name(value)));
            return;
        }
    }
    if let Some(options) = schema.get("enum").and_then(Value::as_array) {
        if !options.contains(value) {
            out.push(format!("{}: {} is not one of the enumerated values", at, value));
        }
    }
    if let Some(n) = value.as_f64() {
        if let Some(min) = schema.get("minimum").and_then(Value::as_f64).filter(|m| n < *m) {
            out.push(format!("{}: {} is below minimum {}", at, n, min));
        }
        if let Some(max) = schema.get("maximum").and_then(Value::as_f64).filter(|m| n > *m) {
            out.push(format!("{}: {} is above maximum {}", at, n, max));
        }
    }
    if let Some(text) = value.as_str() {
        let len = text.chars().count() as u64;
        if let Some(min) = schema.get("minLength").and_then(Value::as_u64).filter(|m| len < *m) {
            out.push(format!("{}: shorter than {} characters", at, min));
        }
        if let Some(max) = schema.get("maxLength").and_then(Value::as_u64).filter(|m| len > *m) {
            out.push(format!("{}: longer than {} characters", at, max));
        }
        if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
            if !patterns.matches(pattern, text) {
                out.push(format!("{}: does not match {}", at, pattern));
            }
        }
    }
    if let Value::Object(map) = value {
        check_object(map, schema, path, patterns, out);
    }
    if let (Value::Array(items), Some(item_schema)) = (value, schema.get("items")) {
        for (i, item) in items.iter().enumerate() {
            check_schema(item, item_schema, &format!("{}[{}]", at, i), patterns, out);
        }
    }
}

fn check_object(
    map: &Map<String, Value>,
    schema: &Value,
    path: &str,
    patterns: &Patterns,
    out: &mut Vec<String>,
) {
    let join = |key: &str| {
        if path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", path, key)
        }
    };
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !map.contains_key(key) {
                out.push(format!("{}: required property is missing", join(key)));
            }
        }
    }
    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (key, sub) in props {
            if let Some(v) = map.get(key) {
                check_schema(v, sub, &join(key), patterns, out);
            }
        }
    }
}

pub(super) fn execute(step: &PlanStep, context: &ExecutionContext) -> Result<ExecutionResult> {
    let config: ValidateConfig = step.data_as()?;

    let Some((_, collected)) = context.latest_collect().filter(|(r, _)| r.success) else {
        return Ok(ExecutionResult::failed(
            ResultKind::Validate,
            &step.id,
            "No collected data available for validation",
        ));
    };
    if collected.records.is_empty() {
        return Ok(ExecutionResult::failed(
            ResultKind::Validate,
            &step.id,
            "No records available for validation",
        ));
    }

    let schema = config.schema.as_ref().filter(|_| config.validate_schema);
    let rules: &[ConsistencyRule] = if config.check_consistency {
        &config.rules
    } else {
        &[]
    };
    let completeness: &[String] = if config.check_completeness {
        &config.check_completeness_fields
    } else {
        &[]
    };
    let patterns = Patterns::build(rules, schema)?;

    let mut report = ValidateReport {
        total_checked: collected.records.len(),
        mode: config.mode,
        ..Default::default()
    };
    for (index, record) in collected.records.iter().enumerate() {
        let mut problems = Vec::new();

        let missing: Vec<&str> = completeness
            .iter()
            .filter(|f| is_missing(record.get(f.as_str())))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            report.incompleteness_violations += 1;
            problems.push(format!("missing {}", missing.join(", ")));
        }

        let before = problems.len();
        for rule in rules {
            if let Some(value) = record.get(&rule.field).filter(|v| !v.is_null()) {
                check_rule(rule, value, &patterns, &mut problems);
            }
        }
        if problems.len() > before {
            report.consistency_violations += 1;
        }

        if let Some(schema) = schema {
            let before = problems.len();
            check_schema(record, schema, "", &patterns, &mut problems);
            if problems.len() > before {
                report.schema_violations += 1;
            }
        }

        if problems.is_empty() {
            report.valid_records.push(record.clone());
        } else {
            report.invalid_count += 1;
            if report.issues.len() < MAX_REPORTED_ISSUES {
                report.issues.push(RecordIssue { index, problems });
            }
        }
    }

    report.invalid_rate = report.invalid_count as f64 / report.total_checked as f64;
    if collected.sampled {
        report.estimated_invalid_total =
            Some((report.invalid_rate * collected.total_records as f64).round() as usize);
    }
    let success = match config.mode {
        ValidationMode::Strict => report.invalid_count == 0,
        ValidationMode::Relaxed => report.invalid_rate <= config.max_invalid_rate,
    };
    info!(
        checked = report.total_checked,
        invalid = report.invalid_count,
        incomplete = report.incompleteness_violations,
        success,
        "Validation finished"
    );

    let mut summary = format!(
        "{} of {} record(s) valid ({:.1}% invalid",
        report.valid_records.len(),
        report.total_checked,
        report.invalid_rate * 100.0
    );
    if let Some(estimate) = report.estimated_invalid_total {
        summary.push_str(&format!(
            "; about {} of {} collected",
            estimate, collected.total_records
        ));
    }
    summary.push(')');

    let result = if success {
        ExecutionResult::succeeded(ResultKind::Validate, &step.id, summary)
    } else {
        ExecutionResult::failed(
            ResultKind::Validate,
            &step.id,
            format!("Validation failed in {} mode: {}", mode_name(config.mode), summary),
        )
    };
    Ok(result.with_data(ResultData::Validate(report)))
}

fn mode_name(mode: ValidationMode) -> &'static str {
    match mode {
        ValidationMode::Strict => "strict",
        ValidationMode::Relaxed => "relaxed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::data::CollectReport;
    use serde_json::json;

    fn collected(records: Vec<Value>, total: usize) -> ExecutionContext {
        let mut ctx = ExecutionContext::new();
        let sampled = total > records.len();
        ctx.record(
            ExecutionResult::succeeded(ResultKind::Collect, "collect", "collected").with_data(
                ResultData::Collect(CollectReport {
                    records,
                    total_records: total,
                    sampled,
                    ..Default::default()
                }),
            ),
        )
        .unwrap();
        ctx
    }

    fn run(data: Value, ctx: &ExecutionContext) -> (ExecutionResult, ValidateReport) {
        let step = PlanStep::new("validate", 2, "Validate").with_data(data);
        let result = execute(&step, ctx).unwrap();
        let report = match &result.data {
            ResultData::Validate(report) => report.clone(),
            other => panic!("expected validate payload, got {:?}", other),
        };
        (result, report)
    }

    #[test]
    fn test_incomplete_record_excluded_and_counted() {
        let ctx = collected(
            vec![
                json!({ "id": 1, "email": "a@x.io" }),
                json!({ "id": 2 }),
                json!({ "id": 3, "email": "" }),
            ],
            3,
        );
        let (result, report) = run(json!({ "checkCompletenessFields": ["email"] }), &ctx);
        assert!(!result.success);
        assert_eq!(report.valid_records, vec![json!({ "id": 1, "email": "a@x.io" })]);
        assert_eq!(report.incompleteness_violations, 2);
        assert_eq!(report.issues[0].index, 1);
    }

    #[test]
    fn test_rules_and_schema() {
        let ctx = collected(
            vec![
                json!({ "sku": "AB-1", "qty": 3, "status": "open" }),
                json!({ "sku": "bad", "qty": -1, "status": "open" }),
                json!({ "sku": "CD-2", "qty": 1, "status": "lost" }),
            ],
            3,
        );
        let data = json!({
            "rules": [
                { "field": "qty", "type": "integer", "min": 0 },
                { "field": "sku", "pattern": "^[A-Z]{2}-\\d+$" }
            ],
            "schema": {
                "type": "object",
                "required": ["sku", "qty"],
                "properties": { "status": { "enum": ["open", "closed"] } }
            },
            "mode": "relaxed",
            "maxInvalidRate": 0.7
        });
        let (result, report) = run(data, &ctx);
        assert!(result.success);
        assert_eq!(report.consistency_violations, 1);
        assert_eq!(report.schema_violations, 1);
        assert_eq!(report.valid_records.len(), 1);
        assert_eq!(report.issues[0].problems.len(), 2);
    }

    #[test]
    fn test_sampled_rate_extrapolated() {
        let mut records: Vec<Value> = (0..9).map(|i| json!({ "v": i })).collect();
        records.push(json!({}));
        let ctx = collected(records, 1000);
        let (result, report) = run(json!({ "checkCompletenessFields": ["v"], "mode": "relaxed" }), &ctx);
        assert!(result.success);
        assert_eq!(report.estimated_invalid_total, Some(100));
    }

    #[test]
    fn test_invalid_pattern_is_error() {
        let ctx = collected(vec![json!({ "a": "x" })], 1);
        let step = PlanStep::new("validate", 2, "Validate")
            .with_data(json!({ "rules": [{ "field": "a", "pattern": "(" }] }));
        let err = execute(&step, &ctx).unwrap_err();
        assert_eq!(err.code(), ErrorCode::VALIDATION_INVALID_INPUT);
    }

    #[test]
    fn test_requires_collected_data() {
        let step = PlanStep::new("validate", 2, "Validate");
        let result = execute(&step, &ExecutionContext::new()).unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("No collected data"));
    }
}
