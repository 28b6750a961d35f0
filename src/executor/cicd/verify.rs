use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use url::Url;

use super::SECTION;
use crate::error::Result;
use crate::executor::common::{fill_placeholders, raw_output};
use crate::executor::ExecutorDeps;
use crate::plan::{ExecutionContext, ExecutionResult, PlanStep, ResultData, ResultKind};
use crate::subprocess::ProcessCommandBuilder;

const DEFAULT_ENDPOINT_TIMEOUT_MS: u64 = 5000;

/// A health endpoint, either a bare URL or path, or a detailed check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EndpointSpec {
    Url(String),
    Detailed {
        url: String,
        #[serde(default, rename = "expectedStatus")]
        expected_status: Option<u16>,
        #[serde(default, rename = "timeoutMs")]
        timeout_ms: Option<u64>,
    },
}

impl EndpointSpec {
    fn url(&self) -> &str {
        match self {
            EndpointSpec::Url(url) | EndpointSpec::Detailed { url, .. } => url,
        }
    }

    fn expected_status(&self) -> Option<u16> {
        match self {
            EndpointSpec::Url(_) => None,
            EndpointSpec::Detailed { expected_status, .. } => *expected_status,
        }
    }

    fn timeout(&self) -> Duration {
        let ms = match self {
            EndpointSpec::Url(_) => None,
            EndpointSpec::Detailed { timeout_ms, .. } => *timeout_ms,
        };
        Duration::from_millis(ms.unwrap_or(DEFAULT_ENDPOINT_TIMEOUT_MS))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VerifyConfig {
    pub health_checks: bool,
    pub smoke_tests: bool,
    pub endpoints: Option<Vec<EndpointSpec>>,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            health_checks: true,
            smoke_tests: false,
            endpoints: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub url: String,
    pub status: Option<u16>,
    pub passed: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmokeTestOutcome {
    pub command: String,
    pub passed: bool,
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    pub url: String,
    pub checked: usize,
    pub passed: usize,
    pub failed: usize,
    pub checks: Vec<HealthCheck>,
    pub smoke_test: Option<SmokeTestOutcome>,
}

/// Absolute URLs are used as given; anything else resolves under the deploy URL
fn endpoint_url(base: &str, endpoint: &str) -> std::result::Result<Url, url::ParseError> {
    match Url::parse(endpoint) {
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let mut base = Url::parse(base)?;
            if !base.path().ends_with('/') {
                let path = format!("{}/", base.path());
                base.set_path(&path);
            }
            base.join(endpoint.trim_start_matches('/'))
        }
        parsed => parsed,
    }
}

async fn check_endpoint(deps: &ExecutorDeps, base: &str, endpoint: &EndpointSpec) -> HealthCheck {
    let url = match endpoint_url(base, endpoint.url()) {
        Ok(url) => url,
        Err(e) => {
            warn!(endpoint = %endpoint.url(), error = %e, "Invalid health endpoint");
            return HealthCheck {
                url: endpoint.url().to_string(),
                error: Some(format!("Invalid endpoint URL: {}", e)),
                ..Default::default()
            };
        }
    };
    let limit = endpoint.timeout();
    let started = Instant::now();
    let response = deps.http.get(url.clone()).timeout(limit).send().await;
    let duration_ms = started.elapsed().as_millis() as u64;

    let mut check = HealthCheck {
        url: url.to_string(),
        duration_ms,
        ..Default::default()
    };
    match response {
        Err(e) if e.is_timeout() => {
            check.error = Some(format!("Health check timed out after {}ms", limit.as_millis()));
        }
        Err(e) => {
            check.error = Some(format!("Request failed: {}", e));
        }
        Ok(resp) => {
            let status = resp.status().as_u16();
            check.status = Some(status);
            check.passed = match endpoint.expected_status() {
                Some(expected) => status == expected,
                None => resp.status().is_success(),
            };
            if !check.passed {
                check.error = Some(format!("Unexpected status {}", status));
            }
        }
    }
    if let Some(error) = &check.error {
        warn!(url = %check.url, error = %error, "Health check failed");
    }
    check
}

async fn smoke_test(deps: &ExecutorDeps, url: &str) -> Result<Option<SmokeTestOutcome>> {
    let Some(line) = deps.config_value::<String>(SECTION, "smokeTestCommand") else {
        return Ok(None);
    };
    let line = fill_placeholders(&line, &[("url", url)]);
    let command = ProcessCommandBuilder::from_command_line(&line)?
        .env("DEPLOY_URL", url)
        .build();
    let output = deps.run(command).await?;
    let passed = output.status.success();
    Ok(Some(SmokeTestOutcome {
        command: line,
        passed,
        exit_code: output.status.code(),
        raw_output: (!passed).then(|| raw_output(&output)),
    }))
}

pub(super) async fn execute(
    deps: &ExecutorDeps,
    step: &PlanStep,
    context: &ExecutionContext,
) -> Result<ExecutionResult> {
    let config: VerifyConfig = step.data_as()?;

    let deploy_url = match context.latest_deploy() {
        Some((result, deploy)) if result.success => deploy.url.clone(),
        _ => {
            return Ok(ExecutionResult::failed(
                ResultKind::Verify,
                &step.id,
                "Cannot verify: no successful deployment found",
            ))
        }
    };
    let endpoints: Vec<EndpointSpec> = config
        .endpoints
        .clone()
        .or_else(|| deps.config_value(SECTION, "healthEndpoints"))
        .unwrap_or_else(|| vec![EndpointSpec::Url("/health".to_string())]);
    let base = deploy_url.unwrap_or_default();

    let mut report = VerifyReport {
        url: base.clone(),
        ..Default::default()
    };
    if config.health_checks {
        for endpoint in &endpoints {
            if base.is_empty() && !endpoint.url().starts_with("http") {
                report.checks.push(HealthCheck {
                    url: endpoint.url().to_string(),
                    error: Some("Relative endpoint but the deployment reported no URL".to_string()),
                    ..Default::default()
                });
                continue;
            }
            report.checks.push(check_endpoint(deps, &base, endpoint).await);
        }
    }
    report.checked = report.checks.len();
    report.passed = report.checks.iter().filter(|c| c.passed).count();
    report.failed = report.checked - report.passed;

    if config.smoke_tests {
        report.smoke_test = smoke_test(deps, &base).await?;
    }
    let smoke_ok = report.smoke_test.as_ref().map_or(true, |s| s.passed);
    let success = report.failed == 0 && smoke_ok;
    info!(
        checked = report.checked,
        passed = report.passed,
        failed = report.failed,
        success,
        "Verification finished"
    );

    let mut summary = format!(
        "Health checks: {} passed, {} failed of {}",
        report.passed, report.failed, report.checked
    );
    if let Some(smoke) = &report.smoke_test {
        summary.push_str(if smoke.passed {
            "; smoke tests passed"
        } else {
            "; smoke tests failed"
        });
    }
    let result = if success {
        ExecutionResult::succeeded(ResultKind::Verify, &step.id, summary)
    } else {
        ExecutionResult::failed(ResultKind::Verify, &step.id, summary)
    };
    Ok(result.with_data(ResultData::Verify(report)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigStore, EngineSettings};
    use crate::executor::cicd::test_support::deps;
    use crate::executor::cicd::DeployReport;
    use crate::subprocess::MockProcessRunner;
    use crate::testing::{StubResponse, StubServer};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn deployed_at(url: &str) -> ExecutionContext {
        let mut ctx = ExecutionContext::new();
        ctx.record(
            ExecutionResult::succeeded(ResultKind::Deploy, "deploy", "deployed").with_data(
                ResultData::Deploy(DeployReport {
                    url: Some(url.to_string()),
                    ..Default::default()
                }),
            ),
        )
        .unwrap();
        ctx
    }

    #[test]
    fn test_endpoint_url_joining() {
        let join = |base: &str, endpoint: &str| endpoint_url(base, endpoint).unwrap().to_string();
        assert_eq!(join("https://a.io/", "/health"), "https://a.io/health");
        assert_eq!(join("https://a.io", "ready"), "https://a.io/ready");
        assert_eq!(join("https://a.io/app", "/health"), "https://a.io/app/health");
        assert_eq!(join("https://a.io/app/", "status?full=1"), "https://a.io/app/status?full=1");
        assert_eq!(join("https://a.io", "http://b.io/up"), "http://b.io/up");
        assert!(endpoint_url("not a url", "/health").is_err());
    }

    #[tokio::test]
    async fn test_requires_successful_deploy() {
        let tmp = TempDir::new().unwrap();
        let runner = MockProcessRunner::new();
        let deps = deps(&runner, json!({}), tmp.path());
        let result = execute(&deps, &PlanStep::new("verify", 5, "Verify"), &ExecutionContext::new())
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("deployment"));
    }

    #[tokio::test]
    async fn test_hanging_endpoint_counts_as_failure() {
        let server = StubServer::start(vec![
            ("/health", StubResponse::json(200, &json!({ "ok": true }))),
            ("/slow", StubResponse::hang()),
        ])
        .await
        .unwrap();
        let tmp = TempDir::new().unwrap();
        let runner = MockProcessRunner::new();
        let deps = deps(&runner, json!({}), tmp.path());

        let step = PlanStep::new("verify", 5, "Verify").with_data(json!({
            "endpoints": ["/health", { "url": "/slow", "timeoutMs": 200 }]
        }));
        let result = execute(&deps, &step, &deployed_at(&server.base_url()))
            .await
            .unwrap();

        assert!(!result.success);
        let ResultData::Verify(report) = result.data else {
            panic!("expected verify payload");
        };
        assert_eq!((report.checked, report.passed, report.failed), (2, 1, 1));
        assert!(report.checks[1].error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_endpoint_timeout_outlasts_client_timeout() {
        let server = StubServer::start(vec![("/slow", StubResponse::hang())])
            .await
            .unwrap();
        let tmp = TempDir::new().unwrap();
        let runner = MockProcessRunner::new();
        let mut settings = EngineSettings::default().with_working_dir(tmp.path());
        settings.http_timeout = Duration::from_millis(300);
        let deps = ExecutorDeps::new(
            Arc::new(runner.clone()),
            Arc::new(ConfigStore::from_value(json!({}))),
            settings,
        )
        .unwrap();

        let step = PlanStep::new("verify", 5, "Verify").with_data(json!({
            "endpoints": [{ "url": "/slow", "timeoutMs": 1000 }]
        }));
        let result = execute(&deps, &step, &deployed_at(&server.base_url()))
            .await
            .unwrap();

        let ResultData::Verify(report) = result.data else {
            panic!("expected verify payload");
        };
        let check = &report.checks[0];
        assert_eq!(
            check.error.as_deref(),
            Some("Health check timed out after 1000ms")
        );
        assert!(check.duration_ms >= 900, "gave up after {}ms", check.duration_ms);
    }

    #[tokio::test]
    async fn test_expected_status_and_smoke_test() {
        let server = StubServer::start(vec![("/gone", StubResponse::text(410, "gone"))])
            .await
            .unwrap();
        let tmp = TempDir::new().unwrap();
        let mut runner = MockProcessRunner::new();
        runner.expect_command("npx").returns_exit_code(0).finish();
        let config = json!({ "cicd": { "smokeTestCommand": "npx playwright test --base-url {url}" } });
        let deps = deps(&runner, config, tmp.path());

        let step = PlanStep::new("verify", 5, "Verify").with_data(json!({
            "smokeTests": true,
            "endpoints": [{ "url": "/gone", "expectedStatus": 410 }]
        }));
        let base = server.base_url();
        let result = execute(&deps, &step, &deployed_at(&base)).await.unwrap();
        assert!(result.success, "{:?}", result.error);

        let call = &runner.get_call_history()[0];
        assert_eq!(call.args.last(), Some(&base));
    }
}
