use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;
use uuid::Uuid;

use super::{ToolClient, ToolError};
use crate::error::{EngineError, ErrorCode};

/// JSON-RPC 2.0 over HTTP, one `tools/call` request per invocation
pub struct HttpToolClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpToolClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, EngineError> {
        let endpoint = Url::parse(endpoint).map_err(|e| {
            EngineError::config_with_code(
                ErrorCode::CONFIG_INVALID_VALUE,
                format!("Invalid tool endpoint '{}'", endpoint),
            )
            .with_source(e)
        })?;
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
            api_key: None,
            timeout,
        })
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn request_body(method: &str, params: Value) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": Uuid::new_v4().to_string(),
            "method": "tools/call",
            "params": { "name": method, "arguments": params }
        })
    }

    async fn send(&self, method: &str, params: Value) -> Result<Value, ToolError> {
        let mut request = self
            .http
            .post(self.endpoint.clone())
            .json(&Self::request_body(method, params));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| self.transport(method, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Status {
                method: method.to_string(),
                status: status.as_u16(),
            });
        }

        let envelope: Value = response.json().await.map_err(|e| ToolError::Malformed {
            method: method.to_string(),
            reason: e.to_string(),
        })?;
        extract_result(method, envelope)
    }

    fn transport(&self, method: &str, err: reqwest::Error) -> ToolError {
        if err.is_timeout() {
            ToolError::Timeout {
                method: method.to_string(),
                timeout: self.timeout,
            }
        } else {
            ToolError::Transport {
                method: method.to_string(),
                source: err,
            }
        }
    }
}

#[async_trait]
impl ToolClient for HttpToolClient {
    async fn invoke(&self, method: &str, params: Value) -> Result<Value, ToolError> {
        tracing::debug!(method, endpoint = %self.endpoint, "Invoking tool");
        match tokio::time::timeout(self.timeout, self.send(method, params)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                method: method.to_string(),
                timeout: self.timeout,
            }),
        }
    }
}

/// Pull the tool payload out of a JSON-RPC envelope.
///
/// Tool servers wrap their output as `result.content[].text`; a text item that
/// holds JSON is decoded, otherwise the text itself is returned. Results
/// without a `content` list are returned as-is.
pub fn extract_result(method: &str, envelope: Value) -> Result<Value, ToolError> {
    if let Some(error) = envelope.get("error").filter(|e| !e.is_null()) {
        return Err(ToolError::Rpc {
            method: method.to_string(),
            code: error.get("code").and_then(Value::as_i64).unwrap_or(-1),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }

    let result = envelope
        .get("result")
        .cloned()
        .ok_or_else(|| ToolError::Malformed {
            method: method.to_string(),
            reason: "response has neither result nor error".to_string(),
        })?;

    let Some(content) = result.get("content").and_then(Value::as_array) else {
        return Ok(result);
    };

    let text = content
        .iter()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
        .find_map(|item| item.get("text").and_then(Value::as_str))
        .ok_or_else(|| ToolError::Malformed {
            method: method.to_string(),
            reason: "content has no text item".to_string(),
        })?;

    if result.get("isError").and_then(Value::as_bool) == Some(true) {
        return Err(ToolError::Rpc {
            method: method.to_string(),
            code: -32000,
            message: text.to_string(),
        });
    }

    Ok(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StubResponse, StubServer};

    #[test]
    fn test_extract_result_decodes_text_content() {
        let envelope = json!({
            "jsonrpc": "2.0",
            "id": "1",
            "result": { "content": [{ "type": "text", "text": "{\"solution\":{\"plan\":{\"steps\":[]}}}" }] }
        });
        let value = extract_result("sequentialthinking", envelope).unwrap();
        assert_eq!(value, json!({ "solution": { "plan": { "steps": [] } } }));
    }

    #[test]
    fn test_extract_result_reports_rpc_and_tool_errors() {
        let rpc = extract_result(
            "resolve-library-id",
            json!({ "error": { "code": -32601, "message": "no such tool" } }),
        )
        .unwrap_err();
        assert!(matches!(rpc, ToolError::Rpc { code: -32601, .. }));

        let tool = extract_result(
            "resolve-library-id",
            json!({ "result": { "isError": true, "content": [{ "type": "text", "text": "boom" }] } }),
        )
        .unwrap_err();
        assert!(matches!(tool, ToolError::Rpc { message, .. } if message == "boom"));

        let malformed = extract_result("x", json!({ "id": 1 })).unwrap_err();
        assert!(matches!(malformed, ToolError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_invoke_posts_tools_call_with_bearer() {
        let server = StubServer::start(vec![(
            "/rpc",
            StubResponse::json(200, &json!({ "jsonrpc": "2.0", "id": "1", "result": { "ok": true } })),
        )])
        .await
        .unwrap();

        let client = HttpToolClient::new(&server.url("/rpc"), Duration::from_secs(5))
            .unwrap()
            .with_api_key(Some("secret".into()));
        let value = client
            .invoke("sequentialthinking", json!({ "thought": "plan" }))
            .await
            .unwrap();
        assert_eq!(value, json!({ "ok": true }));

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].header("authorization"), Some("Bearer secret"));
        let body: Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(body["method"], "tools/call");
        assert_eq!(body["params"]["name"], "sequentialthinking");
        assert_eq!(body["params"]["arguments"]["thought"], "plan");
    }

    #[tokio::test]
    async fn test_invoke_times_out_on_silent_server() {
        let server = StubServer::start(vec![("/rpc", StubResponse::hang())])
            .await
            .unwrap();
        let client = HttpToolClient::new(&server.url("/rpc"), Duration::from_millis(200)).unwrap();

        let err = client.invoke("sequentialthinking", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_invoke_maps_http_status() {
        let server = StubServer::start(vec![("/rpc", StubResponse::text(503, "down"))])
            .await
            .unwrap();
        let client = HttpToolClient::new(&server.url("/rpc"), Duration::from_secs(5)).unwrap();

        let err = client.invoke("sequentialthinking", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::Status { status: 503, .. }));
    }
}
