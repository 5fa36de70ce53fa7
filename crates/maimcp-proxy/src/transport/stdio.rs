//! Line-delimited JSON-RPC over a child process's stdio.
//!
//! Requests are written as one JSON line to the child's stdin; the matching
//! response is the next response line on its stdout. The reader accepts
//! lines up to [`MAX_LINE_BYTES`]; anything longer is a transport error.
//! Concurrent sends on the same upstream serialize on one async mutex so
//! writes and reads on the pipes never interleave, and requests complete in
//! submission order.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::StreamExt;
use maimcp_protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::trace;

use super::{MAX_LINE_BYTES, REQUEST_TIMEOUT};
use crate::error::{ProxyError, ProxyResult};

type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;
type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;

struct Pipes {
    /// Child stdin; taken on close so the pipe drops and the child sees EOF.
    writer: Option<BoxedWriter>,
    reader: FramedRead<BoxedReader, LinesCodec>,
}

/// Driver for a stdio upstream.
pub struct StdioDriver {
    name: String,
    io: Mutex<Pipes>,
}

impl StdioDriver {
    /// Take the piped stdin/stdout of a freshly spawned child.
    ///
    /// # Errors
    ///
    /// Returns a transport error if either stream was not piped.
    pub fn from_child(name: impl Into<String>, child: &mut Child) -> ProxyResult<Self> {
        let name = name.into();
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProxyError::transport(format!("'{name}': child stdin not piped")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProxyError::transport(format!("'{name}': child stdout not piped")))?;
        Ok(Self::from_io(name, stdout, stdin))
    }

    /// Build a driver over raw streams: `reader` is what responses arrive
    /// on, `writer` is where requests go.
    pub fn from_io<R, W>(name: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Send + 'static,
    {
        let reader: BoxedReader = Box::pin(reader);
        let writer: BoxedWriter = Box::pin(writer);
        Self {
            name: name.into(),
            io: Mutex::new(Pipes {
                writer: Some(writer),
                reader: FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_BYTES)),
            }),
        }
    }

    /// Write one JSON line and, when `read_reply` is set, read lines until a
    /// response arrives. Server-initiated notifications on stdout are logged
    /// and skipped.
    async fn exchange(&self, line: String, read_reply: bool) -> ProxyResult<Option<String>> {
        let mut io = self.io.lock().await;
        let writer = io
            .writer
            .as_mut()
            .ok_or_else(|| ProxyError::transport(format!("'{}': transport closed", self.name)))?;
        writer.write_all(line.as_bytes()).await.map_err(|e| {
            ProxyError::transport(format!("'{}': write failed: {e}", self.name))
        })?;
        writer
            .write_all(b"\n")
            .await
            .map_err(|e| ProxyError::transport(format!("'{}': write failed: {e}", self.name)))?;
        writer
            .flush()
            .await
            .map_err(|e| ProxyError::transport(format!("'{}': flush failed: {e}", self.name)))?;

        if !read_reply {
            return Ok(None);
        }

        loop {
            let line = match io.reader.next().await {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    return Err(ProxyError::transport(format!(
                        "'{}': read failed: {e}",
                        self.name
                    )));
                }
                None => {
                    return Err(ProxyError::transport(format!(
                        "'{}': process closed its stdout",
                        self.name
                    )));
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            // Servers may interleave notifications with responses; only a
            // message carrying a result or an error answers the request.
            let value: serde_json::Value = serde_json::from_str(&line).map_err(|e| {
                ProxyError::transport(format!("'{}': invalid JSON line: {e}", self.name))
            })?;
            if value.get("result").is_some() || value.get("error").is_some() {
                return Ok(Some(line));
            }
            trace!(server = %self.name, "skipping non-response line");
        }
    }
}

#[async_trait]
impl super::Driver for StdioDriver {
    async fn send(&self, request: JsonRpcRequest) -> ProxyResult<JsonRpcResponse> {
        let line = serde_json::to_string(&request)?;
        let reply = tokio::time::timeout(REQUEST_TIMEOUT, self.exchange(line, true))
            .await
            .map_err(|_| {
                ProxyError::transport(format!(
                    "'{}': no response within {}s",
                    self.name,
                    REQUEST_TIMEOUT.as_secs()
                ))
            })??
            .unwrap_or_default();
        serde_json::from_str(&reply).map_err(|e| {
            ProxyError::transport(format!("'{}': malformed response: {e}", self.name))
        })
    }

    async fn notify(&self, notification: JsonRpcNotification) -> ProxyResult<()> {
        let line = serde_json::to_string(&notification)?;
        tokio::time::timeout(REQUEST_TIMEOUT, self.exchange(line, false))
            .await
            .map_err(|_| {
                ProxyError::transport(format!("'{}': notification write timed out", self.name))
            })??;
        Ok(())
    }

    async fn close(&self) {
        self.io.lock().await.writer.take();
    }
}
