use crate::error::{EngineError, ErrorCode};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Failed to spawn '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid command line '{0}'")]
    InvalidCommandLine(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Mock expectation not met: {0}")]
    MockExpectationNotMet(String),
}

/// Convert ProcessError to EngineError
impl From<ProcessError> for EngineError {
    fn from(err: ProcessError) -> Self {
        let (code, command) = match &err {
            ProcessError::CommandNotFound(cmd) => {
                (ErrorCode::EXEC_COMMAND_NOT_FOUND, Some(cmd.clone()))
            }
            ProcessError::SpawnFailed { command, .. } => {
                (ErrorCode::EXEC_SPAWN_FAILED, Some(command.clone()))
            }
            ProcessError::Timeout(_) => (ErrorCode::EXEC_TIMEOUT, None),
            ProcessError::InvalidCommandLine(line) => {
                (ErrorCode::EXEC_INVALID_COMMAND_LINE, Some(line.clone()))
            }
            ProcessError::Io(_) => (ErrorCode::EXEC_SPAWN_FAILED, None),
            ProcessError::MockExpectationNotMet(_) => (ErrorCode::EXEC_GENERIC, None),
        };

        EngineError::execution_with_code(code, err.to_string(), command).with_source(err)
    }
}
