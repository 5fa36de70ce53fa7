//! SSE bootstrap: discover the HTTP endpoint behind an event-stream URL.
//!
//! On first contact the upstream is opened with `Accept: text/event-stream`
//! and its data lines are scanned until one carries a JSON object with an
//! `endpoint` field. That endpoint becomes the HTTP target for all
//! subsequent calls. A stream that closes first fails startup.

use futures_util::StreamExt;
use reqwest::header;
use serde_json::Value;

use super::REQUEST_TIMEOUT;
use crate::error::{ProxyError, ProxyResult};

/// Incremental scanner over SSE data lines.
#[derive(Debug, Default)]
pub struct EndpointScanner {
    buf: String,
}

impl EndpointScanner {
    /// Feed a chunk; returns the endpoint as soon as a data line yields one.
    pub fn push(&mut self, chunk: &str) -> Option<String> {
        self.buf.push_str(chunk);
        while let Some(pos) = self.buf.find('\n') {
            let line: String = self.buf.drain(..=pos).collect();
            if let Some(endpoint) = endpoint_from_line(line.trim_end()) {
                return Some(endpoint);
            }
        }
        None
    }
}

fn endpoint_from_line(line: &str) -> Option<String> {
    let data = line.strip_prefix("data:")?.trim();
    let value: Value = serde_json::from_str(data).ok()?;
    value
        .get("endpoint")
        .and_then(Value::as_str)
        .map(str::to_owned)
}

/// Open the SSE stream at `url` and scan it for the follow-up HTTP endpoint.
///
/// # Errors
///
/// Returns a transport error if the request fails, the server answers with a
/// non-success status, or the stream ends before yielding an endpoint.
pub async fn bootstrap_endpoint(name: &str, url: &str) -> ProxyResult<String> {
    let client = reqwest::Client::builder()
        .connect_timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| ProxyError::transport(format!("http client: {e}")))?;
    let response = client
        .get(url)
        .header(header::ACCEPT, "text/event-stream")
        .send()
        .await
        .map_err(|e| ProxyError::transport(format!("'{name}': {e}")))?;
    if !response.status().is_success() {
        return Err(ProxyError::transport(format!(
            "'{name}': SSE endpoint returned {}",
            response.status()
        )));
    }

    let mut scanner = EndpointScanner::default();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| ProxyError::transport(format!("'{name}': SSE read: {e}")))?;
        if let Some(endpoint) = scanner.push(&String::from_utf8_lossy(&chunk)) {
            return Ok(endpoint);
        }
    }
    Err(ProxyError::transport(format!(
        "'{name}': SSE stream closed before yielding an endpoint"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn finds_endpoint_across_chunks() {
        let mut scanner = EndpointScanner::default();
        assert_eq!(scanner.push(": ping\n\ndata: {\"end"), None);
        assert_eq!(
            scanner.push("point\":\"https://x.y/mcp/conn42\"}\n\n"),
            Some("https://x.y/mcp/conn42".to_owned())
        );
    }

    #[test]
    fn ignores_data_without_endpoint() {
        let mut scanner = EndpointScanner::default();
        assert_eq!(scanner.push("data: {\"hello\":1}\n"), None);
        assert_eq!(scanner.push("data: not json\n"), None);
        assert_eq!(
            scanner.push("data: {\"endpoint\":\"https://a/b\"}\n"),
            Some("https://a/b".to_owned())
        );
    }
}
