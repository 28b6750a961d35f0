//! Domain planners
//!
//! A planner expands a parameter object plus its domain's configuration
//! section into a [`Plan`]. Every value a planner puts into step data is
//! resolved the same way: explicit parameter, then configuration, then a
//! hard-coded default (see [`ParamResolver`]).

pub mod cicd;
pub mod data;
pub mod documentation;

pub use cicd::CicdPlanner;
pub use data::DataPlanner;
pub use documentation::DocumentationPlanner;

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::{lookup_path, ConfigProvider};
use crate::error::{EngineError, ErrorCode, Result};
use crate::plan::{Domain, Plan};

/// Turns parameters into a plan for one domain
pub trait Planner: Send + Sync {
    fn domain(&self) -> Domain;

    fn create_plan(&self, params: &Map<String, Value>) -> Result<Plan>;
}

/// Build the planner for a domain. Goal-driven (`general`) plans come from
/// the planning service, not from a template planner.
pub fn planner_for(domain: Domain, config: Arc<dyn ConfigProvider>) -> Result<Box<dyn Planner>> {
    match domain {
        Domain::Cicd => Ok(Box::new(CicdPlanner::new(config))),
        Domain::Data => Ok(Box::new(DataPlanner::new(config))),
        Domain::Documentation => Ok(Box::new(DocumentationPlanner::new(config))),
        Domain::General => Err(EngineError::plan_with_code(
            ErrorCode::PLAN_UNSUPPORTED_DOMAIN,
            "General plans are produced from a goal by the planning service",
            None,
        )),
    }
}

/// Looks a value up in the parameters, then in the domain configuration
pub struct ParamResolver<'a> {
    params: &'a Map<String, Value>,
    config: Value,
}

impl<'a> ParamResolver<'a> {
    pub fn new(params: &'a Map<String, Value>, config: Value) -> Self {
        Self { params, config }
    }

    /// First non-null value of `params[param]`, `config[config_path]`
    pub fn optional(&self, param: &str, config_path: &str) -> Option<Value> {
        self.params
            .get(param)
            .filter(|v| !v.is_null())
            .or_else(|| lookup_path(&self.config, config_path))
            .cloned()
    }

    pub fn value(&self, param: &str, config_path: &str, default: Value) -> Value {
        self.optional(param, config_path).unwrap_or(default)
    }

    pub fn string(&self, param: &str, config_path: &str, default: &str) -> String {
        match self.optional(param, config_path) {
            Some(Value::String(s)) if !s.is_empty() => s,
            _ => default.to_string(),
        }
    }

    pub fn flag(&self, param: &str, config_path: &str, default: bool) -> bool {
        self.optional(param, config_path)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }

    /// Plan name or description override from the parameters
    pub fn param_string(&self, param: &str) -> Option<String> {
        self.params
            .get(param)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// Step data builder that skips absent optional values
#[derive(Default)]
pub(crate) struct StepData(Map<String, Value>);

impl StepData {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub(crate) fn set_opt(mut self, key: &str, value: Option<Value>) -> Self {
        if let Some(value) = value {
            self.0.insert(key.to_string(), value);
        }
        self
    }

    pub(crate) fn build(self) -> Value {
        Value::Object(self.0)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::ConfigStore;
    use serde_json::{Map, Value};
    use std::sync::Arc;

    pub fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    pub fn config(value: Value) -> Arc<ConfigStore> {
        Arc::new(ConfigStore::from_value(value))
    }

    pub fn ids(plan: &crate::plan::Plan) -> Vec<&str> {
        plan.steps.iter().map(|s| s.id.as_str()).collect()
    }
}
