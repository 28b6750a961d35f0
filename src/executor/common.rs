//! Helpers shared by the domain executors

use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::ExecutorDeps;
use crate::error::{EngineError, ErrorCode, Result};
use crate::plan::{ExecutionResult, ResultKind};
use crate::subprocess::{ProcessCommand, ProcessCommandBuilder, ProcessError, ProcessOutput};

/// Longest stretch of raw process output attached to a result
const MAX_RAW_OUTPUT: usize = 4000;

impl ExecutorDeps {
    /// Command line configured at `<domain>.<path>`, or `default`. Configured
    /// values may be a string (split like a shell would) or an argv array.
    pub fn configured_command(
        &self,
        domain: &str,
        path: &str,
        default: &str,
    ) -> std::result::Result<ProcessCommandBuilder, ProcessError> {
        match self.config.get_config_value(domain, path, Value::Null) {
            Value::String(line) => ProcessCommandBuilder::from_command_line(&line),
            Value::Array(items) => {
                let argv: Vec<String> = items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
                match argv.split_first() {
                    Some((program, args)) => Ok(ProcessCommandBuilder::new(program).args(args)),
                    None => Err(ProcessError::InvalidCommandLine(format!(
                        "{}.{} is an empty command",
                        domain, path
                    ))),
                }
            }
            _ => ProcessCommandBuilder::from_command_line(default),
        }
    }

    /// Run a command in the working directory under the engine-wide timeout.
    /// Explicit per-command settings win.
    pub async fn run(
        &self,
        mut command: ProcessCommand,
    ) -> std::result::Result<ProcessOutput, ProcessError> {
        if command.working_dir.is_none() {
            command.working_dir = Some(self.settings.working_dir.clone());
        }
        if command.timeout.is_none() {
            command.timeout = self.settings.process_timeout();
        }
        debug!(command = %command.display(), "Running step command");
        self.runner.run(command).await
    }

    /// Typed value from a domain's configuration section
    pub fn config_value<T: serde::de::DeserializeOwned>(&self, domain: &str, path: &str) -> Option<T> {
        match self.config.get_config_value(domain, path, Value::Null) {
            Value::Null => None,
            value => serde_json::from_value(value).ok(),
        }
    }

    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.settings.resolve(path)
    }

    /// Write a pretty-printed JSON report into the report directory
    pub async fn write_report<T: Serialize>(&self, file_name: &str, report: &T) -> Result<PathBuf> {
        let dir = self.settings.report_dir();
        write_json(&dir.join(file_name), report).await
    }
}

/// Turn a handler error into a failed result for the step
pub fn recover(kind: ResultKind, step_id: &str, outcome: Result<ExecutionResult>) -> ExecutionResult {
    match outcome {
        Ok(result) => result,
        Err(e) => {
            warn!(step_id, code = e.code(), error = %e, "Step handler failed");
            ExecutionResult::failed(kind, step_id, e.user_message())
        }
    }
}

/// Write pretty-printed JSON, creating parent directories
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<PathBuf> {
    let content = serde_json::to_string_pretty(value)?;
    write_text(path, &content).await
}

pub async fn write_text(path: &Path, content: &str) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| storage_error(parent, "create directory", e))?;
    }
    tokio::fs::write(path, content)
        .await
        .map_err(|e| storage_error(path, "write", e))?;
    Ok(path.to_path_buf())
}

pub fn storage_error(path: &Path, operation: &str, err: std::io::Error) -> EngineError {
    EngineError::storage_with_code(
        ErrorCode::STORAGE_IO_ERROR,
        format!("Failed to {} {}", operation, path.display()),
        Some(path.to_path_buf()),
    )
    .with_source(err)
}

/// Combined output cut down to a size worth carrying in a result
pub fn raw_output(output: &ProcessOutput) -> String {
    let combined = output.combined_output();
    if combined.len() <= MAX_RAW_OUTPUT {
        return combined;
    }
    let mut end = MAX_RAW_OUTPUT;
    while !combined.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n... (truncated)", &combined[..end])
}

/// Replace `{key}` placeholders
pub fn fill_placeholders(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), value)
    })
}
