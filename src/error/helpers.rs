use super::{EngineError, ErrorCode};

/// Extension trait for convenient error conversion
pub trait ErrorExt<T> {
    /// Convert to EngineError with context
    fn to_engine(self, context: impl Into<String>) -> Result<T, EngineError>;

    /// Convert to EngineError with specific error type
    fn to_config_error(self, message: impl Into<String>) -> Result<T, EngineError>;
    fn to_storage_error(self, message: impl Into<String>) -> Result<T, EngineError>;
    fn to_execution_error(self, message: impl Into<String>) -> Result<T, EngineError>;
}

impl<T, E> ErrorExt<T> for Result<T, E>
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    fn to_engine(self, context: impl Into<String>) -> Result<T, EngineError> {
        self.map_err(|e| EngineError::other(context).with_source(e))
    }

    fn to_config_error(self, message: impl Into<String>) -> Result<T, EngineError> {
        self.map_err(|e| EngineError::config(message).with_source(e))
    }

    fn to_storage_error(self, message: impl Into<String>) -> Result<T, EngineError> {
        self.map_err(|e| EngineError::storage(message).with_source(e))
    }

    fn to_execution_error(self, message: impl Into<String>) -> Result<T, EngineError> {
        self.map_err(|e| EngineError::execution(message).with_source(e))
    }
}

/// Helper functions for common error scenarios
pub mod common {
    use super::*;

    /// Create a not found error for configuration
    pub fn config_not_found(path: impl AsRef<std::path::Path>) -> EngineError {
        EngineError::config_with_code(
            ErrorCode::CONFIG_NOT_FOUND,
            format!("Configuration file not found: {}", path.as_ref().display()),
        )
    }

    /// The step id has no handler in the domain's executor
    pub fn unknown_step(domain: &str, step_id: &str) -> EngineError {
        EngineError::plan_with_code(
            ErrorCode::PLAN_UNKNOWN_STEP,
            format!("Unknown {} step: {}", domain, step_id),
            Some(step_id.to_string()),
        )
    }

    /// A `dependsOn` entry does not resolve to a step in the plan
    pub fn dangling_dependency(step_id: &str, dependency: &str) -> EngineError {
        EngineError::plan_with_code(
            ErrorCode::PLAN_DANGLING_DEPENDENCY,
            format!(
                "Step '{}' depends on '{}', which is not part of the plan",
                step_id, dependency
            ),
            Some(step_id.to_string()),
        )
    }

    /// Create an invalid status transition error
    pub fn invalid_transition(
        step_id: &str,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> EngineError {
        EngineError::workflow_with_code(
            ErrorCode::WORKFLOW_INVALID_TRANSITION,
            format!("Cannot move step from {} to {}", from, to),
        )
        .with_step(step_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_step_message() {
        let err = common::unknown_step("CI/CD", "package");
        assert_eq!(err.code(), ErrorCode::PLAN_UNKNOWN_STEP);
        assert_eq!(err.message(), "Unknown CI/CD step: package");
    }

    #[test]
    fn test_error_ext_wraps_source() {
        let parsed: Result<u32, std::num::ParseIntError> = "x".parse::<u32>();
        let err = parsed.to_config_error("bad port").unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_GENERIC);
        assert!(std::error::Error::source(&err).is_some());
    }
}
