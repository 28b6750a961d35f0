//! Common test utilities and helpers

#![allow(dead_code)]

use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use seqplan::config::{ConfigStore, PlanningSettings};
use seqplan::planning::PlanningService;
use seqplan::subprocess::MockProcessRunner;
use seqplan::tools::{methods, MockToolClient};
use seqplan::Runtime;

/// Planning service whose reasoning tool is offline, so plans come from the
/// local fallback
pub fn offline_planning() -> PlanningService {
    PlanningService::new(
        Arc::new(MockToolClient::new().fail(methods::SEQUENTIAL_THINKING, "offline")),
        Arc::new(MockToolClient::new()),
        Arc::new(MockToolClient::new()),
        &PlanningSettings {
            tool_timeout: Duration::from_secs(1),
            ..Default::default()
        },
    )
}

/// Runtime rooted at `dir` with `sections` merged next to the `engine` section
pub fn runtime(dir: &Path, sections: Value, runner: &MockProcessRunner) -> Runtime {
    let mut root = match sections {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    root.insert(
        "engine".to_string(),
        json!({ "workingDir": dir, "processTimeout": "10s", "httpTimeout": "2s" }),
    );
    Runtime::new(
        ConfigStore::from_value(Value::Object(root)),
        Arc::new(runner.clone()),
        offline_planning(),
    )
}

pub fn params(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub fn write(dir: &Path, relative: &str, content: &str) {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}
