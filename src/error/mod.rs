use std::fmt::Display;
use std::path::PathBuf;
use thiserror::Error;

pub mod codes;
pub mod helpers;

pub use codes::{describe_error_code, ErrorCode};
pub use helpers::{common, ErrorExt};

/// The unified error type for the engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("[E{code:04}] Configuration error: {message}")]
    Config {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Plan error: {message}")]
    Plan {
        code: u16,
        message: String,
        step: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Storage error: {message}")]
    Storage {
        code: u16,
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Execution error: {message}")]
    Execution {
        code: u16,
        message: String,
        command: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Workflow error: {message}")]
    Workflow {
        code: u16,
        message: String,
        plan_id: Option<String>,
        step: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Planning error: {message}")]
    Planning {
        code: u16,
        message: String,
        tool: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Validation error: {message}")]
    Validation {
        code: u16,
        message: String,
        field: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] {message}")]
    Other {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl EngineError {
    /// Create a configuration error with default code
    pub fn config(message: impl Into<String>) -> Self {
        Self::config_with_code(ErrorCode::CONFIG_GENERIC, message)
    }

    /// Create a configuration error with specific code
    pub fn config_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Config {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create a plan construction error with specific code and offending step
    pub fn plan_with_code(code: u16, message: impl Into<String>, step: Option<String>) -> Self {
        Self::Plan {
            code,
            message: message.into(),
            step,
            source: None,
        }
    }

    /// Create a storage error with default code
    pub fn storage(message: impl Into<String>) -> Self {
        Self::storage_with_code(ErrorCode::STORAGE_GENERIC, message, None)
    }

    /// Create a storage error with specific code and path
    pub fn storage_with_code(code: u16, message: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self::Storage {
            code,
            message: message.into(),
            path,
            source: None,
        }
    }

    /// Create an execution error with default code
    pub fn execution(message: impl Into<String>) -> Self {
        Self::execution_with_code(ErrorCode::EXEC_GENERIC, message, None)
    }

    /// Create an execution error with specific code
    pub fn execution_with_code(
        code: u16,
        message: impl Into<String>,
        command: Option<String>,
    ) -> Self {
        Self::Execution {
            code,
            message: message.into(),
            command,
            source: None,
        }
    }

    /// Create a workflow error with specific code
    pub fn workflow_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Workflow {
            code,
            message: message.into(),
            plan_id: None,
            step: None,
            source: None,
        }
    }

    /// Create a planning service error with specific code
    pub fn planning_with_code(code: u16, message: impl Into<String>, tool: Option<String>) -> Self {
        Self::Planning {
            code,
            message: message.into(),
            tool,
            source: None,
        }
    }

    /// Create a validation error with default code
    pub fn validation(message: impl Into<String>) -> Self {
        Self::validation_with_code(ErrorCode::VALIDATION_GENERIC, message, None)
    }

    /// Create a validation error with specific code and field
    pub fn validation_with_code(
        code: u16,
        message: impl Into<String>,
        field: Option<String>,
    ) -> Self {
        Self::Validation {
            code,
            message: message.into(),
            field,
            source: None,
        }
    }

    /// Create a generic other error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            code: ErrorCode::OTHER_GENERIC,
            message: message.into(),
            source: None,
        }
    }

    /// Add a source error to this error
    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        match &mut self {
            Self::Config { source: src, .. }
            | Self::Plan { source: src, .. }
            | Self::Storage { source: src, .. }
            | Self::Execution { source: src, .. }
            | Self::Workflow { source: src, .. }
            | Self::Planning { source: src, .. }
            | Self::Validation { source: src, .. }
            | Self::Other { source: src, .. } => {
                *src = Some(source.into());
            }
        }
        self
    }

    /// Add context to the error message
    pub fn with_context(mut self, context: impl Display) -> Self {
        match &mut self {
            Self::Config { message, .. }
            | Self::Plan { message, .. }
            | Self::Storage { message, .. }
            | Self::Execution { message, .. }
            | Self::Workflow { message, .. }
            | Self::Planning { message, .. }
            | Self::Validation { message, .. }
            | Self::Other { message, .. } => {
                *message = format!("{}: {}", message, context);
            }
        }
        self
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 2,
            Self::Plan { .. } => 3,
            Self::Storage { .. } => 4,
            Self::Execution { .. } => 5,
            Self::Workflow { .. } => 6,
            Self::Planning { .. } => 7,
            Self::Validation { .. } => 8,
            Self::Other { .. } => 1,
        }
    }

    /// Get the error code
    pub fn code(&self) -> u16 {
        match self {
            Self::Config { code, .. }
            | Self::Plan { code, .. }
            | Self::Storage { code, .. }
            | Self::Execution { code, .. }
            | Self::Workflow { code, .. }
            | Self::Planning { code, .. }
            | Self::Validation { code, .. }
            | Self::Other { code, .. } => *code,
        }
    }

    /// Get the bare message without the code prefix
    pub fn message(&self) -> &str {
        match self {
            Self::Config { message, .. }
            | Self::Plan { message, .. }
            | Self::Storage { message, .. }
            | Self::Execution { message, .. }
            | Self::Workflow { message, .. }
            | Self::Planning { message, .. }
            | Self::Validation { message, .. }
            | Self::Other { message, .. } => message,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Config { message, .. } => format!("Configuration problem: {}", message),
            Self::Plan { message, step, .. } => match step {
                Some(s) => format!("Invalid plan at step '{}': {}", s, message),
                None => format!("Invalid plan: {}", message),
            },
            Self::Storage { message, path, .. } => match path {
                Some(p) => format!("Storage error at {}: {}", p.display(), message),
                None => format!("Storage error: {}", message),
            },
            Self::Execution {
                message, command, ..
            } => match command {
                Some(cmd) => format!("Command '{}' failed: {}", cmd, message),
                None => format!("Execution error: {}", message),
            },
            Self::Workflow {
                message,
                plan_id,
                step,
                ..
            } => {
                let mut msg = String::from("Workflow error");
                if let Some(id) = plan_id {
                    msg.push_str(&format!(" in '{}'", id));
                }
                if let Some(s) = step {
                    msg.push_str(&format!(" at step '{}'", s));
                }
                format!("{}: {}", msg, message)
            }
            Self::Planning { message, tool, .. } => match tool {
                Some(t) => format!("Planning tool '{}' error: {}", t, message),
                None => format!("Planning error: {}", message),
            },
            Self::Validation { message, field, .. } => match field {
                Some(f) => format!("Validation error for '{}': {}", f, message),
                None => format!("Validation error: {}", message),
            },
            Self::Other { message, .. } => message.clone(),
        }
    }

    /// Set the step for plan and workflow errors
    pub fn with_step(mut self, step_id: impl Into<String>) -> Self {
        match self {
            Self::Plan {
                step: ref mut s, ..
            }
            | Self::Workflow {
                step: ref mut s, ..
            } => *s = Some(step_id.into()),
            _ => {}
        }
        self
    }

    /// Set the plan id for a workflow error
    pub fn with_plan(mut self, id: impl Into<String>) -> Self {
        if let Self::Workflow {
            plan_id: ref mut p, ..
        } = self
        {
            *p = Some(id.into());
        }
        self
    }
}

/// Type alias for Results using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let (code, message) = match err.kind() {
            ErrorKind::NotFound => (ErrorCode::STORAGE_NOT_FOUND, "File or directory not found"),
            ErrorKind::PermissionDenied => {
                (ErrorCode::STORAGE_PERMISSION_DENIED, "Permission denied")
            }
            ErrorKind::AlreadyExists => (ErrorCode::STORAGE_ALREADY_EXISTS, "Already exists"),
            ErrorKind::InvalidInput => (ErrorCode::VALIDATION_INVALID_INPUT, "Invalid input"),
            ErrorKind::InvalidData => (ErrorCode::VALIDATION_INVALID_DATA, "Invalid data"),
            ErrorKind::TimedOut => (ErrorCode::EXEC_TIMEOUT, "Operation timed out"),
            ErrorKind::Interrupted => (ErrorCode::EXEC_INTERRUPTED, "Operation interrupted"),
            _ => (ErrorCode::STORAGE_IO_ERROR, "IO operation failed"),
        };

        EngineError::storage_with_code(code, message, None).with_source(err)
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(err: serde_yaml::Error) -> Self {
        EngineError::config_with_code(ErrorCode::CONFIG_INVALID_YAML, "Invalid YAML syntax")
            .with_source(err)
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::config_with_code(ErrorCode::CONFIG_INVALID_JSON, "Invalid JSON syntax")
            .with_source(err)
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::config_with_code(ErrorCode::CONFIG_INVALID_TOML, "Invalid TOML syntax")
            .with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation_and_chaining() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "plan.json");
        let err = EngineError::storage("Cannot read plan")
            .with_source(io_err)
            .with_context("while loading run input");

        assert_eq!(err.code(), ErrorCode::STORAGE_GENERIC);
        assert!(err.to_string().contains("[E3000]"));
        assert!(err.user_message().contains("Cannot read plan"));
        assert_eq!(err.message(), "Cannot read plan: while loading run input");

        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "plan.json");
        assert!(std::error::Error::source(&EngineError::other("bare")).is_none());
    }

    #[test]
    fn test_plan_error_carries_step() {
        let err = EngineError::plan_with_code(
            ErrorCode::PLAN_DANGLING_DEPENDENCY,
            "depends on missing step 'ghost'",
            None,
        )
        .with_step("deploy");

        assert_eq!(err.exit_code(), 3);
        assert_eq!(
            err.user_message(),
            "Invalid plan at step 'deploy': depends on missing step 'ghost'"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let err: EngineError = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow").into();
        assert_eq!(err.code(), ErrorCode::EXEC_TIMEOUT);
        assert_eq!(err.exit_code(), 4);
    }
}
