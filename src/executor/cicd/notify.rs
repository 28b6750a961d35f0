use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

use super::SECTION;
use crate::error::Result;
use crate::executor::common::{fill_placeholders, write_text};
use crate::executor::ExecutorDeps;
use crate::plan::{ExecutionContext, ExecutionResult, PlanStep, ResultData, ResultKind};
use crate::subprocess::ProcessCommandBuilder;

const DEFAULT_MAIL_COMMAND: &str = "mail -s \"Pipeline {status}\"";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotifyConfig {
    pub channels: Vec<String>,
    pub only_on_failure: bool,
    pub recipients: Vec<String>,
    pub webhook_url: Option<String>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            channels: vec!["log".to_string()],
            only_on_failure: false,
            recipients: Vec::new(),
            webhook_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelOutcome {
    pub channel: String,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyReport {
    pub pipeline_success: bool,
    pub notifications_sent: bool,
    pub channels: Vec<ChannelOutcome>,
    pub report: String,
}

/// Status line plus one line per recorded step other than `skip_id`
fn pipeline_report(context: &ExecutionContext, skip_id: &str) -> (bool, String) {
    let results: Vec<&ExecutionResult> = context.iter().filter(|r| r.step_id != skip_id).collect();
    let success = results.iter().all(|r| r.success);

    let mut report = format!(
        "Pipeline status: {}\nDetails:\n",
        if success { "SUCCESS" } else { "FAILURE" }
    );
    for result in results {
        if result.success {
            report.push_str(&format!("{}: OK\n", result.step_id));
        } else {
            report.push_str(&format!(
                "{}: Failed - {}\n",
                result.step_id,
                result.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }
    (success, report)
}

struct Delivery<'a> {
    deps: &'a ExecutorDeps,
    config: &'a NotifyConfig,
    success: bool,
    report: &'a str,
}

impl Delivery<'_> {
    fn status(&self) -> &'static str {
        if self.success {
            "SUCCESS"
        } else {
            "FAILURE"
        }
    }

    async fn send(&self, channel: &str) -> std::result::Result<(), String> {
        match channel {
            "log" => {
                info!(status = self.status(), "{}", self.report);
                Ok(())
            }
            "file" => {
                let path: PathBuf = self.deps.settings.report_dir().join("notification.txt");
                write_text(&path, self.report)
                    .await
                    .map(|_| ())
                    .map_err(|e| e.user_message())
            }
            "webhook" | "slack" => self.post(channel).await,
            "email" => self.mail().await,
            other => Err(format!("Unsupported notification channel '{}'", other)),
        }
    }

    async fn post(&self, channel: &str) -> std::result::Result<(), String> {
        let url = self
            .config
            .webhook_url
            .clone()
            .or_else(|| self.deps.config_value(SECTION, "webhookUrl"))
            .ok_or_else(|| "No webhook URL configured".to_string())?;
        let payload = if channel == "slack" {
            json!({ "text": self.report })
        } else {
            json!({ "status": self.status(), "success": self.success, "report": self.report })
        };
        let response = self
            .deps
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| format!("POST {} failed: {}", url, e))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("POST {} returned {}", url, response.status()))
        }
    }

    async fn mail(&self) -> std::result::Result<(), String> {
        if self.config.recipients.is_empty() {
            return Err("No email recipients configured".to_string());
        }
        let template = self
            .deps
            .configured_command(SECTION, "mailCommand", DEFAULT_MAIL_COMMAND)
            .map_err(|e| e.to_string())?
            .build();
        let status = [("status", self.status())];
        let command = ProcessCommandBuilder::new(&template.program)
            .args(template.args.iter().map(|a| fill_placeholders(a, &status)))
            .args(&self.config.recipients)
            .stdin(self.report.to_string())
            .build();
        let output = self.deps.run(command).await.map_err(|e| e.to_string())?;
        if output.status.success() {
            Ok(())
        } else {
            Err(format!("Mail command exited with {}", output.status))
        }
    }
}

pub(super) async fn execute(
    deps: &ExecutorDeps,
    step: &PlanStep,
    context: &ExecutionContext,
) -> Result<ExecutionResult> {
    let config: NotifyConfig = step.data_as()?;
    let (pipeline_success, report_text) = pipeline_report(context, &step.id);

    let mut report = NotifyReport {
        pipeline_success,
        report: report_text,
        ..Default::default()
    };
    if config.only_on_failure && pipeline_success {
        info!("Pipeline succeeded; notifications only go out on failure");
        return Ok(ExecutionResult::succeeded(
            ResultKind::Notify,
            &step.id,
            "Pipeline succeeded; no notification sent",
        )
        .with_data(ResultData::Notify(report)));
    }

    let delivery = Delivery {
        deps,
        config: &config,
        success: pipeline_success,
        report: &report.report,
    };
    let mut channels = Vec::with_capacity(config.channels.len());
    for channel in &config.channels {
        let outcome = match delivery.send(channel).await {
            Ok(()) => ChannelOutcome {
                channel: channel.clone(),
                delivered: true,
                error: None,
            },
            Err(error) => {
                warn!(channel = %channel, error = %error, "Notification not delivered");
                ChannelOutcome {
                    channel: channel.clone(),
                    delivered: false,
                    error: Some(error),
                }
            }
        };
        channels.push(outcome);
    }
    report.channels = channels;
    report.notifications_sent = report.channels.iter().any(|c| c.delivered);

    let failed: Vec<&str> = report
        .channels
        .iter()
        .filter(|c| !c.delivered)
        .map(|c| c.channel.as_str())
        .collect();
    let result = if failed.is_empty() {
        ExecutionResult::succeeded(
            ResultKind::Notify,
            &step.id,
            format!(
                "Sent pipeline {} notification via {}",
                delivery.status(),
                config.channels.join(", ")
            ),
        )
    } else {
        ExecutionResult::failed(
            ResultKind::Notify,
            &step.id,
            format!("Notification failed for channel(s): {}", failed.join(", ")),
        )
    };
    Ok(result.with_data(ResultData::Notify(report)))
}
