//! Clients for the external reasoning and tool-invocation services.
//!
//! Every caller treats these services as unreliable: any [`ToolError`] is a
//! signal to fall back, never a reason to abort a run.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::error::{EngineError, ErrorCode};

pub mod http;
pub mod mock;

pub use http::HttpToolClient;
pub use mock::MockToolClient;

/// Method names understood by the tool servers
pub mod methods {
    pub const SEQUENTIAL_THINKING: &str = "sequentialthinking";
    pub const RESOLVE_LIBRARY_ID: &str = "resolve-library-id";
    pub const GET_LIBRARY_DOCS: &str = "get-library-docs";
    pub const COMPONENT_BUILDER: &str = "21st_magic_component_builder";
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("No endpoint configured for tool '{0}'")]
    NotConfigured(String),

    #[error("Request to '{method}' failed: {source}")]
    Transport {
        method: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Tool '{method}' answered with HTTP {status}")]
    Status { method: String, status: u16 },

    #[error("Tool '{method}' returned error {code}: {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    #[error("Malformed response from '{method}': {reason}")]
    Malformed { method: String, reason: String },

    #[error("Tool '{method}' timed out after {timeout:?}")]
    Timeout { method: String, timeout: Duration },

    #[error("Mock expectation not met: {0}")]
    MockExpectationNotMet(String),
}

impl From<ToolError> for EngineError {
    fn from(err: ToolError) -> Self {
        let (code, tool) = match &err {
            ToolError::NotConfigured(method) => {
                (ErrorCode::PLANNING_TOOL_UNAVAILABLE, Some(method.clone()))
            }
            ToolError::Transport { method, .. } | ToolError::Status { method, .. } => {
                (ErrorCode::PLANNING_TOOL_UNAVAILABLE, Some(method.clone()))
            }
            ToolError::Rpc { method, .. } | ToolError::Malformed { method, .. } => {
                (ErrorCode::PLANNING_MALFORMED_RESPONSE, Some(method.clone()))
            }
            ToolError::Timeout { method, .. } => (ErrorCode::PLANNING_TIMEOUT, Some(method.clone())),
            ToolError::MockExpectationNotMet(_) => (ErrorCode::PLANNING_GENERIC, None),
        };
        EngineError::planning_with_code(code, err.to_string(), tool).with_source(err)
    }
}

/// RPC-style invocation of a named tool
#[async_trait]
pub trait ToolClient: Send + Sync {
    async fn invoke(&self, method: &str, params: Value) -> Result<Value, ToolError>;
}

/// Stand-in used when no endpoint is configured for a tool family
pub struct UnconfiguredToolClient {
    family: &'static str,
}

impl UnconfiguredToolClient {
    pub fn new(family: &'static str) -> Self {
        Self { family }
    }
}

#[async_trait]
impl ToolClient for UnconfiguredToolClient {
    async fn invoke(&self, method: &str, _params: Value) -> Result<Value, ToolError> {
        tracing::debug!(family = self.family, method, "Tool family has no endpoint");
        Err(ToolError::NotConfigured(method.to_string()))
    }
}
