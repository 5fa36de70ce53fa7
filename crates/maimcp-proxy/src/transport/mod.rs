//! Upstream transport drivers.
//!
//! One driver per upstream kind. Every driver exposes the same operation:
//! send a JSON-RPC request and return the matching response, or a transport
//! error. SSE upstreams have no driver of their own: the bootstrap handshake
//! in [`sse`] yields the HTTP endpoint that the [`http`] driver then talks
//! to.

pub mod http;
pub mod sse;
pub mod stdio;

use async_trait::async_trait;
use maimcp_protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use std::time::Duration;

use crate::error::ProxyResult;

/// Per-exchange deadline. A deadline firing is a transport error that does
/// not terminate the upstream.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum accepted length of a single response line from a stdio upstream.
pub const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

/// A connected upstream transport.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Send a request and wait for the matching response.
    async fn send(&self, request: JsonRpcRequest) -> ProxyResult<JsonRpcResponse>;

    /// Send a notification; nothing is awaited beyond the write.
    async fn notify(&self, notification: JsonRpcNotification) -> ProxyResult<()>;

    /// Release the transport's write side, if it has one. Further sends
    /// fail with a transport error.
    async fn close(&self) {}
}

pub use http::HttpDriver;
pub use sse::bootstrap_endpoint;
pub use stdio::StdioDriver;
