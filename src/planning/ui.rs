use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use tracing::{info, warn};

use crate::plan::{ExecutionResult, ResultData, ResultKind};
use crate::tools::{methods, ToolClient};

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\W+").expect("Valid regex pattern"));

/// What to ask the component generator for
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UiRequest {
    /// Full user request
    pub message: String,
    /// Short query naming the component
    pub search_query: String,
    pub context: Option<String>,
}

/// Payload of a `ui` step
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiReport {
    pub request: UiRequest,
    pub component_name: Option<String>,
    pub code: Option<String>,
    pub instructions: Option<String>,
}

/// `Generated_<query>` with runs of non-word characters collapsed to `_`
pub fn default_component_name(query: &str) -> String {
    let cleaned = NON_WORD.replace_all(query, "_");
    if cleaned.is_empty() {
        "Generated_Component".to_string()
    } else {
        format!("Generated_{}", cleaned)
    }
}

pub(crate) async fn build_component(
    client: &dyn ToolClient,
    step_id: &str,
    request: &UiRequest,
    current_file: &Path,
    project_root: &Path,
) -> ExecutionResult {
    let mut report = UiReport {
        request: request.clone(),
        ..Default::default()
    };

    if request.message.trim().is_empty() || request.search_query.trim().is_empty() {
        return ExecutionResult::failed(
            ResultKind::Ui,
            step_id,
            "Component request needs both a message and a search query",
        )
        .with_data(ResultData::Ui(report));
    }

    let context = request.context.clone().unwrap_or_else(|| {
        format!(
            "User requests a UI component for: \"{}\". Full request: \"{}\".",
            request.search_query,
            request.message.chars().take(150).collect::<String>()
        )
    });
    let response = client
        .invoke(
            methods::COMPONENT_BUILDER,
            json!({
                "message": request.message,
                "searchQuery": request.search_query,
                "absolutePathToCurrentFile": current_file,
                "absolutePathToProjectDirectory": project_root,
                "context": context,
            }),
        )
        .await;

    let payload = match response {
        Ok(value) => value,
        Err(e) => {
            warn!(step_id, error = %e, "Component generation failed");
            return ExecutionResult::failed(
                ResultKind::Ui,
                step_id,
                format!("UI generation failed for \"{}\": {}", request.search_query, e),
            )
            .with_data(ResultData::Ui(report));
        }
    };

    let text = |key: &str| {
        payload
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let Some(code) = text("code") else {
        let reason = text("error").unwrap_or_else(|| "no code returned".to_string());
        return ExecutionResult::failed(
            ResultKind::Ui,
            step_id,
            format!("UI generation failed for \"{}\": {}", request.search_query, reason),
        )
        .with_data(ResultData::Ui(report));
    };

    let name = text("componentName")
        .unwrap_or_else(|| default_component_name(&request.search_query));
    info!(step_id, component = %name, "Generated UI component");
    let summary = format!(
        "Generated UI component \"{}\" for query \"{}\".",
        name, request.search_query
    );
    report.component_name = Some(name);
    report.code = Some(code);
    report.instructions = text("instructions");
    ExecutionResult::succeeded(ResultKind::Ui, step_id, summary).with_data(ResultData::Ui(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::MockToolClient;

    fn request() -> UiRequest {
        UiRequest {
            message: "A pricing card with three tiers".into(),
            search_query: "pricing card / tiers".into(),
            context: None,
        }
    }

    #[test]
    fn test_default_component_name() {
        assert_eq!(default_component_name("pricing card / tiers"), "Generated_pricing_card_tiers");
        assert_eq!(default_component_name(""), "Generated_Component");
    }

    #[tokio::test]
    async fn test_response_without_code_fails() {
        let mock = MockToolClient::new()
            .respond(methods::COMPONENT_BUILDER, json!({ "instructions": "n/a" }));
        let result =
            build_component(&mock, "ui-1", &request(), Path::new("/p/src/App.tsx"), Path::new("/p")).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("no code returned"));
    }

    #[tokio::test]
    async fn test_generated_name_used_when_tool_omits_it() {
        let mock = MockToolClient::new().respond(
            methods::COMPONENT_BUILDER,
            json!({ "code": "export const Card = () => null;" }),
        );
        let result =
            build_component(&mock, "ui-1", &request(), Path::new("/p/src/App.tsx"), Path::new("/p")).await;
        assert!(result.success);
        let ResultData::Ui(report) = result.data else {
            panic!("expected ui payload");
        };
        assert_eq!(report.component_name.as_deref(), Some("Generated_pricing_card_tiers"));

        let (_, params) = &mock.calls()[0];
        assert_eq!(params["absolutePathToProjectDirectory"], "/p");
    }
}
