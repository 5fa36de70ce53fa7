//! JSON-RPC over HTTP: one POST per request.
//!
//! Some streamable-HTTP servers answer a plain POST with an SSE-framed body;
//! the driver unwraps the first `data:` line in that case so callers always
//! see a bare JSON-RPC response.

use async_trait::async_trait;
use maimcp_protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use reqwest::header;

use super::REQUEST_TIMEOUT;
use crate::error::{ProxyError, ProxyResult};

/// Driver for an HTTP upstream (including SSE upstreams after bootstrap).
pub struct HttpDriver {
    name: String,
    client: reqwest::Client,
    url: String,
    bearer: Option<String>,
}

impl HttpDriver {
    /// Build a driver for `url`, optionally attaching a bearer token.
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        bearer: Option<String>,
    ) -> ProxyResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProxyError::transport(format!("http client: {e}")))?;
        Ok(Self {
            name: name.into(),
            client,
            url: url.into(),
            bearer,
        })
    }

    /// Endpoint this driver talks to.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, body: String) -> ProxyResult<String> {
        let mut request = self
            .client
            .post(&self.url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json, text/event-stream")
            .body(body);
        if let Some(token) = &self.bearer {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ProxyError::transport(format!("'{}': {e}", self.name)))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProxyError::transport(format!("'{}': reading body: {e}", self.name)))?;
        if !status.is_success() {
            let snippet: String = text.chars().take(200).collect();
            return Err(ProxyError::transport(format!(
                "'{}': upstream returned {status}: {snippet}",
                self.name
            )));
        }
        Ok(text)
    }
}

#[async_trait]
impl super::Driver for HttpDriver {
    async fn send(&self, request: JsonRpcRequest) -> ProxyResult<JsonRpcResponse> {
        let body = self.post(serde_json::to_string(&request)?).await?;
        let payload = unwrap_sse_body(&body);
        serde_json::from_str(payload).map_err(|e| {
            ProxyError::transport(format!("'{}': malformed response: {e}", self.name))
        })
    }

    async fn notify(&self, notification: JsonRpcNotification) -> ProxyResult<()> {
        self.post(serde_json::to_string(&notification)?).await?;
        Ok(())
    }
}

/// Extract the first `data:` payload when the body is SSE-framed; otherwise
/// return the body as-is.
fn unwrap_sse_body(body: &str) -> &str {
    if body.starts_with("event:") || body.starts_with("data:") {
        body.lines()
            .find_map(|l| l.strip_prefix("data:").map(str::trim))
            .unwrap_or(body)
    } else {
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_body_passes_through() {
        let body = r#"{"jsonrpc":"2.0","id":1,"result":{}}"#;
        assert_eq!(unwrap_sse_body(body), body);
    }

    #[test]
    fn sse_body_is_unwrapped() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n\n";
        assert_eq!(
            unwrap_sse_body(body),
            r#"{"jsonrpc":"2.0","id":1,"result":{}}"#
        );
    }
}
