use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{ToolClient, ToolError};

#[derive(Debug, Clone)]
enum Scripted {
    Reply(Value),
    Fail(String),
}

/// Scripted `ToolClient` for tests.
///
/// Responses are queued per method and consumed in order; the last queued
/// response for a method keeps answering once the queue is down to one.
#[derive(Clone, Default)]
pub struct MockToolClient {
    responses: Arc<Mutex<HashMap<String, VecDeque<Scripted>>>>,
    calls: Arc<Mutex<Vec<(String, Value)>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockToolClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, method: &str, value: Value) -> Self {
        self.push(method, Scripted::Reply(value));
        self
    }

    pub fn fail(self, method: &str, message: &str) -> Self {
        self.push(method, Scripted::Fail(message.to_string()));
        self
    }

    fn push(&self, method: &str, scripted: Scripted) {
        lock(&self.responses)
            .entry(method.to_string())
            .or_default()
            .push_back(scripted);
    }

    /// Every `(method, params)` pair received, in order
    pub fn calls(&self) -> Vec<(String, Value)> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        lock(&self.calls).iter().filter(|(m, _)| m == method).count()
    }
}

#[async_trait]
impl ToolClient for MockToolClient {
    async fn invoke(&self, method: &str, params: Value) -> Result<Value, ToolError> {
        lock(&self.calls).push((method.to_string(), params));

        let scripted = {
            let mut responses = lock(&self.responses);
            let queue = responses.get_mut(method).ok_or_else(|| {
                ToolError::MockExpectationNotMet(format!("No response scripted for '{}'", method))
            })?;
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        };

        match scripted {
            Some(Scripted::Reply(value)) => Ok(value),
            Some(Scripted::Fail(message)) => Err(ToolError::Rpc {
                method: method.to_string(),
                code: -1,
                message,
            }),
            None => Err(ToolError::MockExpectationNotMet(format!(
                "No response scripted for '{}'",
                method
            ))),
        }
    }
}
