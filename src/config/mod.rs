//! Layered configuration for planners and executors.
//!
//! Configuration is a JSON tree whose top-level keys are domains (`engine`,
//! `planning`, `cicd`, `data`, `documentation`). Planners and executors only
//! see it through [`ConfigProvider`], so a missing file, a missing domain or a
//! missing key all degrade to the caller's hard-coded default.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

pub mod loader;
pub mod settings;

pub use loader::ConfigLoader;
pub use settings::{EngineSettings, PlanningSettings};

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "SEQPLAN";

/// Read access to per-domain configuration
pub trait ConfigProvider: Send + Sync {
    /// Whole configuration for a domain; an empty object when absent
    fn get_config(&self, domain: &str) -> Value;

    /// Value at a dot-separated `path` inside a domain, or `default`
    fn get_config_value(&self, domain: &str, path: &str, default: Value) -> Value {
        lookup_path(&self.get_config(domain), path)
            .cloned()
            .unwrap_or(default)
    }
}

/// Resolve a dot-separated path. `null` counts as missing.
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Parse an override string: JSON literals (`90`, `true`, `["a"]`) keep their
/// type, anything else is taken as a plain string.
pub fn parse_override_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced by an object"),
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    root: Map<String, Value>,
    source: Option<PathBuf>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a JSON document. Non-object documents yield an empty store.
    pub fn from_value(value: Value) -> Self {
        let root = match value {
            Value::Object(map) => map,
            other => {
                tracing::warn!(kind = ?other, "Configuration root is not a table, ignoring it");
                Map::new()
            }
        };
        Self { root, source: None }
    }

    pub fn with_source(mut self, path: &Path) -> Self {
        self.source = Some(path.to_path_buf());
        self
    }

    /// File the store was loaded from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Set `domain.path` to `value`, creating intermediate tables
    pub fn set(&mut self, domain: &str, path: &str, value: Value) {
        let mut current = self
            .root
            .entry(domain.to_string())
            .or_insert_with(|| Value::Object(Map::new()));

        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        let Some((last, parents)) = segments.split_last() else {
            *current = value;
            return;
        };

        for segment in parents {
            current = ensure_object(current)
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        ensure_object(current).insert(last.to_string(), value);
    }

    /// Apply overrides from the process environment
    pub fn merge_env_vars(&mut self) {
        self.merge_env_from(std::env::vars());
    }

    /// Apply overrides from `(name, value)` pairs.
    ///
    /// Named variables map onto well-known keys; the generic form
    /// `SEQPLAN__<domain>__<key>__<subkey>` sets any key, keeping the key's case.
    pub fn merge_env_from<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        const NAMED: &[(&str, &str, &str)] = &[
            ("SEQPLAN_LOG_LEVEL", "engine", "logLevel"),
            ("SEQPLAN_PROCESS_TIMEOUT", "engine", "processTimeout"),
            ("SEQPLAN_WORKING_DIR", "engine", "workingDir"),
            ("SEQPLAN_REPORT_DIR", "engine", "reportDir"),
            ("SEQPLAN_REASONING_URL", "planning", "reasoningUrl"),
            ("SEQPLAN_KNOWLEDGE_URL", "planning", "knowledgeUrl"),
            ("SEQPLAN_UI_URL", "planning", "uiUrl"),
            ("SEQPLAN_TOOL_API_KEY", "planning", "apiKey"),
        ];
        let generic_prefix = format!("{}__", ENV_PREFIX);

        for (name, raw) in vars {
            if let Some((_, domain, key)) = NAMED.iter().find(|(var, _, _)| *var == name) {
                tracing::debug!(var = %name, "Applying environment override");
                self.set(domain, key, Value::String(raw));
                continue;
            }

            if let Some(rest) = name.strip_prefix(&generic_prefix) {
                let mut parts = rest.split("__");
                let domain = parts.next().unwrap_or_default().to_lowercase();
                let path: Vec<&str> = parts.collect();
                if domain.is_empty() || path.is_empty() {
                    tracing::warn!(var = %name, "Ignoring malformed configuration override");
                    continue;
                }
                tracing::debug!(var = %name, "Applying environment override");
                self.set(&domain, &path.join("."), parse_override_value(&raw));
            }
        }
    }

    /// Typed engine settings; invalid sections fall back to defaults
    pub fn engine_settings(&self) -> EngineSettings {
        self.typed_section("engine")
    }

    /// Typed planning-service settings; invalid sections fall back to defaults
    pub fn planning_settings(&self) -> PlanningSettings {
        self.typed_section("planning")
    }

    fn typed_section<T>(&self, domain: &str) -> T
    where
        T: serde::de::DeserializeOwned + Default,
    {
        match serde_json::from_value(self.get_config(domain)) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(domain, error = %e, "Invalid configuration section, using defaults");
                T::default()
            }
        }
    }
}

impl ConfigProvider for ConfigStore {
    fn get_config(&self, domain: &str) -> Value {
        match self.root.get(domain) {
            Some(Value::Object(map)) => Value::Object(map.clone()),
            _ => Value::Object(Map::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> ConfigStore {
        ConfigStore::from_value(json!({
            "cicd": {
                "linters": ["eslint", "stylelint"],
                "coverageThreshold": 90,
                "healthCheck": { "timeoutMs": 2500 }
            }
        }))
    }

    #[test]
    fn test_get_config_value_walks_paths() {
        let store = store();
        assert_eq!(
            store.get_config_value("cicd", "healthCheck.timeoutMs", json!(5000)),
            json!(2500)
        );
        assert_eq!(
            store.get_config_value("cicd", "linters.1", json!(null)),
            json!("stylelint")
        );
    }

    #[test]
    fn test_missing_domain_and_key_use_default() {
        let store = store();
        assert_eq!(store.get_config("data"), json!({}));
        assert_eq!(
            store.get_config_value("data", "defaultDestination", json!("./data/processed")),
            json!("./data/processed")
        );
        assert_eq!(
            store.get_config_value("cicd", "deployStrategy", json!("standard")),
            json!("standard")
        );
    }

    #[test]
    fn test_env_overrides_named_and_generic() {
        let mut store = store();
        store.merge_env_from(vec![
            ("SEQPLAN_LOG_LEVEL".to_string(), "debug".to_string()),
            (
                "SEQPLAN__CICD__healthCheck__timeoutMs".to_string(),
                "750".to_string(),
            ),
            ("SEQPLAN__DATA__outputFormat".to_string(), "csv".to_string()),
            ("SEQPLAN__".to_string(), "ignored".to_string()),
            ("UNRELATED".to_string(), "x".to_string()),
        ]);

        assert_eq!(
            store.get_config_value("engine", "logLevel", json!(null)),
            json!("debug")
        );
        assert_eq!(
            store.get_config_value("cicd", "healthCheck.timeoutMs", json!(0)),
            json!(750)
        );
        assert_eq!(
            store.get_config_value("data", "outputFormat", json!("json")),
            json!("csv")
        );
        assert_eq!(
            store.get_config_value("cicd", "coverageThreshold", json!(0)),
            json!(90)
        );
    }

    #[test]
    fn test_set_replaces_scalar_with_table() {
        let mut store = ConfigStore::new();
        store.set("cicd", "notify", json!(true));
        store.set("cicd", "notify.channels", json!(["log"]));
        assert_eq!(
            store.get_config("cicd"),
            json!({ "notify": { "channels": ["log"] } })
        );
    }

    #[test]
    fn test_invalid_engine_section_falls_back_to_defaults() {
        let store = ConfigStore::from_value(json!({ "engine": { "processTimeout": 12 } }));
        let settings = store.engine_settings();
        assert_eq!(settings, EngineSettings::default());
    }
}
