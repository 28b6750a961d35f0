use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Engine-wide settings from the `engine` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Upper bound for every spawned process (`"30m"`, `"90s"`); `"0s"` disables it
    #[serde(with = "humantime_serde")]
    pub process_timeout: Duration,
    /// Timeout for data-source and notification HTTP calls
    #[serde(with = "humantime_serde")]
    pub http_timeout: Duration,
    /// Directory processes run in and relative paths resolve against
    pub working_dir: PathBuf,
    /// Where executors write ad-hoc JSON reports, relative to `working_dir`
    pub report_dir: PathBuf,
    pub log_level: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            process_timeout: Duration::from_secs(30 * 60),
            http_timeout: Duration::from_secs(30),
            working_dir: PathBuf::from("."),
            report_dir: PathBuf::from("reports"),
            log_level: None,
        }
    }
}

impl EngineSettings {
    /// Process timeout, or `None` when disabled
    pub fn process_timeout(&self) -> Option<Duration> {
        if self.process_timeout.is_zero() {
            None
        } else {
            Some(self.process_timeout)
        }
    }

    /// Resolve a possibly relative path against the working directory
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    pub fn report_dir(&self) -> PathBuf {
        self.resolve(&self.report_dir)
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }
}

/// Settings for the external planning tools from the `planning` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlanningSettings {
    /// JSON-RPC endpoint of the step-generation / summarization tool
    pub reasoning_url: Option<String>,
    /// JSON-RPC endpoint of the documentation lookup tool
    pub knowledge_url: Option<String>,
    /// JSON-RPC endpoint of the UI component generator
    pub ui_url: Option<String>,
    pub api_key: Option<String>,
    #[serde(with = "humantime_serde")]
    pub tool_timeout: Duration,
    pub initial_steps: usize,
}

impl Default for PlanningSettings {
    fn default() -> Self {
        Self {
            reasoning_url: None,
            knowledge_url: None,
            ui_url: None,
            api_key: None,
            tool_timeout: Duration::from_secs(60),
            initial_steps: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_engine_settings_parse_humantime() {
        let settings: EngineSettings = serde_json::from_value(json!({
            "processTimeout": "90s",
            "workingDir": "/srv/app",
            "reportDir": "out/reports"
        }))
        .unwrap();

        assert_eq!(settings.process_timeout(), Some(Duration::from_secs(90)));
        assert_eq!(settings.report_dir(), PathBuf::from("/srv/app/out/reports"));
        assert_eq!(settings.http_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_zero_timeout_disables_limit() {
        let settings: EngineSettings =
            serde_json::from_value(json!({ "processTimeout": "0s" })).unwrap();
        assert_eq!(settings.process_timeout(), None);
    }

    #[test]
    fn test_resolve_keeps_absolute_paths() {
        let settings = EngineSettings::default().with_working_dir("/work");
        assert_eq!(settings.resolve("/tmp/x"), PathBuf::from("/tmp/x"));
        assert_eq!(settings.resolve("dist"), PathBuf::from("/work/dist"));
    }
}
