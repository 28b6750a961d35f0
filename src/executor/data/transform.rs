use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::error::Result;
use crate::plan::{ExecutionContext, ExecutionResult, PlanStep, ResultData, ResultKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arithmetic {
    Add,
    Subtract,
    Multiply,
    Divide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    Exists,
}

/// Field name or literal number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Literal(f64),
    Field(String),
}

/// One named record transformation. A bare string in the step data names a
/// transformation that needs no parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Transformation {
    Rename {
        from: String,
        to: String,
    },
    Calculate {
        target: String,
        operation: Arithmetic,
        operands: Vec<Operand>,
    },
    Filter {
        field: String,
        #[serde(alias = "operator")]
        op: Comparison,
        #[serde(default)]
        value: Value,
    },
    Remove {
        fields: Vec<String>,
    },
    MapValues {
        field: String,
        mapping: Map<String, Value>,
        #[serde(default)]
        default: Option<Value>,
    },
    /// Trim string values, in every field or only the listed ones
    Normalize {
        #[serde(default)]
        fields: Option<Vec<String>>,
    },
}

impl Transformation {
    pub fn name(&self) -> &'static str {
        match self {
            Transformation::Rename { .. } => "rename",
            Transformation::Calculate { .. } => "calculate",
            Transformation::Filter { .. } => "filter",
            Transformation::Remove { .. } => "remove",
            Transformation::MapValues { .. } => "map-values",
            Transformation::Normalize { .. } => "normalize",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransformConfig {
    /// Strings or `{ "type": ..., ... }` objects, decoded one by one so an
    /// unknown entry does not reject the rest
    pub transformations: Vec<Value>,
    pub in_place: bool,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            transformations: vec![json!("normalize")],
            in_place: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedTransformation {
    pub name: String,
    pub applied: bool,
    pub records_affected: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformReport {
    pub records: Vec<Value>,
    pub input_records: usize,
    pub output_records: usize,
    pub transformations: Vec<AppliedTransformation>,
    pub in_place: bool,
}

fn decode(entry: &Value) -> std::result::Result<Transformation, (String, String)> {
    let (name, payload) = match entry {
        Value::String(name) => (name.clone(), json!({ "type": name })),
        Value::Object(map) => (
            map.get("type")
                .and_then(Value::as_str)
                .unwrap_or("unnamed")
                .to_string(),
            entry.clone(),
        ),
        other => (other.to_string(), Value::Null),
    };
    serde_json::from_value(payload).map_err(|e| (name, e.to_string()))
}

fn operand(record: &Map<String, Value>, op: &Operand) -> Option<f64> {
    match op {
        Operand::Literal(n) => Some(*n),
        Operand::Field(name) => record.get(name).and_then(Value::as_f64),
    }
}

fn calculate(operation: Arithmetic, values: &[f64]) -> Option<f64> {
    let (first, rest) = values.split_first()?;
    rest.iter().try_fold(*first, |acc, v| match operation {
        Arithmetic::Add => Some(acc + v),
        Arithmetic::Subtract => Some(acc - v),
        Arithmetic::Multiply => Some(acc * v),
        Arithmetic::Divide => (*v != 0.0).then(|| acc / v),
    })
}

fn compare(actual: Option<&Value>, op: Comparison, expected: &Value) -> bool {
    let Some(actual) = actual.filter(|v| !v.is_null()) else {
        return false;
    };
    let ordering = || match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => match (actual.as_str(), expected.as_str()) {
            (Some(a), Some(b)) => Some(a.cmp(b)),
            _ => None,
        },
    };
    use std::cmp::Ordering::*;
    match op {
        Comparison::Exists => true,
        Comparison::Eq => ordering().map_or(actual == expected, |o| o == Equal),
        Comparison::Ne => ordering().map_or(actual != expected, |o| o != Equal),
        Comparison::Gt => ordering() == Some(Greater),
        Comparison::Gte => matches!(ordering(), Some(Greater | Equal)),
        Comparison::Lt => ordering() == Some(Less),
        Comparison::Lte => matches!(ordering(), Some(Less | Equal)),
        Comparison::Contains => match (actual, expected.as_str()) {
            (Value::String(s), Some(needle)) => s.contains(needle),
            (Value::Array(items), _) => items.contains(expected),
            _ => false,
        },
    }
}

/// Apply one transformation, returning how many records it touched (or
/// dropped, for `filter`)
pub(crate) fn apply(transformation: &Transformation, records: &mut Vec<Value>) -> usize {
    if let Transformation::Filter { field, op, value } = transformation {
        let before = records.len();
        records.retain(|r| compare(r.get(field), *op, value));
        return before - records.len();
    }

    let mut affected = 0;
    for record in records.iter_mut() {
        let Value::Object(map) = record else { continue };
        let touched = match transformation {
            Transformation::Rename { from, to } => match map.remove(from) {
                Some(v) => {
                    map.insert(to.clone(), v);
                    true
                }
                None => false,
            },
            Transformation::Calculate {
                target,
                operation,
                operands,
            } => {
                let values: Option<Vec<f64>> = operands.iter().map(|o| operand(map, o)).collect();
                let result = values
                    .and_then(|v| calculate(*operation, &v))
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number);
                match result {
                    Some(v) => {
                        map.insert(target.clone(), v);
                        true
                    }
                    None => {
                        map.insert(target.clone(), Value::Null);
                        false
                    }
                }
            }
            Transformation::Remove { fields } => fields
                .iter()
                .fold(false, |hit, f| map.remove(f).is_some() || hit),
            Transformation::MapValues {
                field,
                mapping,
                default,
            } => {
                let key = match map.get(field) {
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(Value::Null) | None => None,
                    Some(other) => Some(other.to_string()),
                };
                let replacement = key
                    .and_then(|k| mapping.get(&k).cloned())
                    .or_else(|| default.clone());
                match replacement {
                    Some(v) => {
                        map.insert(field.clone(), v);
                        true
                    }
                    None => false,
                }
            }
            Transformation::Normalize { fields } => {
                let mut hit = false;
                for (key, value) in map.iter_mut() {
                    if fields.as_ref().is_some_and(|f| !f.contains(key)) {
                        continue;
                    }
                    if let Value::String(s) = value {
                        let trimmed = s.trim();
                        if trimmed.len() != s.len() {
                            *s = trimmed.to_string();
                            hit = true;
                        }
                    }
                }
                hit
            }
            Transformation::Filter { .. } => false,
        };
        affected += usize::from(touched);
    }
    affected
}

pub(super) fn execute(step: &PlanStep, context: &ExecutionContext) -> Result<ExecutionResult> {
    let config: TransformConfig = step.data_as()?;
    let Some(input) = context.latest_records() else {
        return Ok(ExecutionResult::failed(
            ResultKind::Transform,
            &step.id,
            "No records available for transformation",
        ));
    };

    let mut records = input.to_vec();
    let mut report = TransformReport {
        input_records: records.len(),
        in_place: config.in_place,
        ..Default::default()
    };
    for entry in &config.transformations {
        let outcome = match decode(entry) {
            Ok(transformation) => {
                let affected = apply(&transformation, &mut records);
                debug!(transformation = transformation.name(), affected, "Applied transformation");
                AppliedTransformation {
                    name: transformation.name().to_string(),
                    applied: true,
                    records_affected: affected,
                    reason: None,
                }
            }
            Err((name, reason)) => {
                debug!(transformation = %name, reason = %reason, "Skipping transformation");
                AppliedTransformation {
                    name,
                    applied: false,
                    records_affected: 0,
                    reason: Some(reason),
                }
            }
        };
        report.transformations.push(outcome);
    }
    report.output_records = records.len();
    report.records = records;

    let applied = report.transformations.iter().filter(|t| t.applied).count();
    let skipped = report.transformations.len() - applied;
    info!(
        input = report.input_records,
        output = report.output_records,
        applied,
        skipped,
        "Transformation finished"
    );
    let mut summary = format!(
        "Transformed {} record(s) into {} with {} transformation(s)",
        report.input_records, report.output_records, applied
    );
    if skipped > 0 {
        summary.push_str(&format!("; {} skipped", skipped));
    }
    Ok(ExecutionResult::succeeded(ResultKind::Transform, &step.id, summary)
        .with_data(ResultData::Transform(report)))
}
