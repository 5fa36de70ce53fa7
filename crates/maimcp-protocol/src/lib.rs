//! Protocol types shared by the mai aggregating proxy.
//!
//! This crate carries the JSON-RPC 2.0 envelope ([`jsonrpc`]) and the MCP
//! capability descriptors and result payloads ([`types`]) that flow between
//! the proxy engine, its upstream servers, and its downstream clients. It is
//! deliberately free of I/O: everything here is plain data plus serde.

pub mod jsonrpc;
pub mod types;

pub use jsonrpc::{
    JsonRpcError, JsonRpcErrorCode, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    JsonRpcVersion, RequestId, JSONRPC_VERSION,
};
pub use types::{
    GetPromptResult, PromptArgument, PromptDescriptor, PromptMessage, ResourceContents,
    ResourceDescriptor, ToolCallResult, ToolContent, ToolDescriptor, ToolParam,
    PROTOCOL_VERSION,
};
