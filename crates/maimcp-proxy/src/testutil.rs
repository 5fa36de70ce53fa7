//! Shared fixtures for in-crate tests: a scriptable driver and upstream
//! builders.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use maimcp_protocol::{
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, PromptDescriptor,
    ToolDescriptor,
};
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::config::ServerConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::transport::Driver;
use crate::upstream::Upstream;

enum Reply {
    Result(Value),
    Error(i32, String),
    Transport,
}

/// Driver answering from a canned method → reply table, recording calls.
#[derive(Clone, Default)]
pub struct MockDriver {
    replies: Arc<Mutex<HashMap<String, Reply>>>,
    calls: Arc<Mutex<Vec<(String, Value)>>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `method` with a success result.
    pub fn on(self, method: &str, result: Value) -> Self {
        self.replies
            .lock()
            .insert(method.to_owned(), Reply::Result(result));
        self
    }

    /// Answer `method` with a JSON-RPC error.
    pub fn error(self, method: &str, code: i32, message: &str) -> Self {
        self.replies
            .lock()
            .insert(method.to_owned(), Reply::Error(code, message.to_owned()));
        self
    }

    /// Fail `method` with a transport error.
    pub fn fail(self, method: &str) -> Self {
        self.replies
            .lock()
            .insert(method.to_owned(), Reply::Transport);
        self
    }

    /// Whether `method` was ever sent.
    pub fn was_called(&self, method: &str) -> bool {
        self.calls.lock().iter().any(|(m, _)| m == method)
    }

    /// Params of the most recent call to `method`.
    pub fn last_params(&self, method: &str) -> Option<Value> {
        self.calls
            .lock()
            .iter()
            .rev()
            .find(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn send(&self, request: JsonRpcRequest) -> ProxyResult<JsonRpcResponse> {
        self.calls.lock().push((
            request.method.clone(),
            request.params.clone().unwrap_or(Value::Null),
        ));
        let replies = self.replies.lock();
        match replies.get(&request.method) {
            Some(Reply::Result(v)) => Ok(JsonRpcResponse::success(v.clone(), request.id)),
            Some(Reply::Error(code, message)) => Ok(JsonRpcResponse::error(
                JsonRpcError::new(*code, message.clone()),
                Some(request.id),
            )),
            Some(Reply::Transport) | None => Err(ProxyError::transport(format!(
                "mock: no reply for {}",
                request.method
            ))),
        }
    }

    async fn notify(&self, notification: JsonRpcNotification) -> ProxyResult<()> {
        self.calls.lock().push((
            notification.method.clone(),
            notification.params.unwrap_or(Value::Null),
        ));
        Ok(())
    }
}

fn stdio_config() -> ServerConfig {
    ServerConfig {
        command: Some("mock".into()),
        ..Default::default()
    }
}

/// Upstream with the given bare tool names and a no-op driver.
pub fn upstream_with_tools(name: &str, tools: &[&str]) -> Arc<Upstream> {
    upstream_with_driver(name, tools, Arc::new(MockDriver::new()))
}

/// Upstream with the given bare tool names around a specific driver.
pub fn upstream_with_driver(
    name: &str,
    tools: &[&str],
    driver: Arc<dyn Driver>,
) -> Arc<Upstream> {
    let up = Upstream::with_driver(name, stdio_config(), false, driver);
    *up.tools.write() = tools
        .iter()
        .map(|t| ToolDescriptor::new(*t, format!("{t} tool"), None))
        .collect();
    up
}

/// Upstream advertising one tool with an input schema.
pub fn upstream_with_schema(
    name: &str,
    tool: &str,
    schema: Value,
    driver: Arc<dyn Driver>,
) -> Arc<Upstream> {
    let up = Upstream::with_driver(name, stdio_config(), false, driver);
    *up.tools.write() = vec![ToolDescriptor::new(tool, "", Some(schema))];
    up
}

/// Upstream advertising the given prompts and a permissive mock driver that
/// echoes `prompts/get`.
pub fn upstream_with_prompts(name: &str, prompts: &[&str]) -> Arc<Upstream> {
    let driver = MockDriver::new().on(
        "prompts/get",
        json!({"description": "mock", "messages": []}),
    );
    let up = Upstream::with_driver(name, stdio_config(), false, Arc::new(driver));
    *up.prompts.write() = prompts
        .iter()
        .map(|p| PromptDescriptor {
            name: (*p).to_owned(),
            description: String::new(),
            arguments: Vec::new(),
        })
        .collect();
    up
}
