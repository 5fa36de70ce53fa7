//! JSON-RPC 2.0 envelope types.
//!
//! The proxy speaks line-delimited JSON-RPC to stdio upstreams, plain
//! JSON-RPC-over-HTTP to remote upstreams, and JSON-RPC-over-HTTP to its own
//! downstream clients. All three share this envelope. Batch requests are not
//! supported anywhere in the proxy; [`is_batch`] exists so facades can refuse
//! them with the proper error code.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// JSON-RPC version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// Zero-sized marker that serializes as the literal `"2.0"` and refuses
/// anything else on deserialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let version = String::deserialize(deserializer)?;
        if version == JSONRPC_VERSION {
            Ok(JsonRpcVersion)
        } else {
            Err(serde::de::Error::custom(format!(
                "invalid JSON-RPC version: expected '{JSONRPC_VERSION}', got '{version}'"
            )))
        }
    }
}

/// Request identifier: a string or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric identifier
    Number(i64),
    /// String identifier
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

/// JSON-RPC request message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version
    pub jsonrpc: JsonRpcVersion,
    /// Request method name
    pub method: String,
    /// Request parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Request identifier
    pub id: RequestId,
}

impl JsonRpcRequest {
    /// Create a request with parameters.
    pub fn new(method: impl Into<String>, params: Value, id: impl Into<RequestId>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params: Some(params),
            id: id.into(),
        }
    }

    /// Create a request without parameters.
    pub fn without_params(method: impl Into<String>, id: impl Into<RequestId>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params: None,
            id: id.into(),
        }
    }
}

/// JSON-RPC notification message (no response expected)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// JSON-RPC version
    pub jsonrpc: JsonRpcVersion,
    /// Notification method name
    pub method: String,
    /// Notification parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Create a notification.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Additional error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Create an error object from a code and message.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// Response payload: exactly one of `result` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcResponsePayload {
    /// Successful response with result
    Success {
        /// Response result
        result: Value,
    },
    /// Error response
    Error {
        /// Response error
        error: JsonRpcError,
    },
}

/// JSON-RPC response message.
///
/// The `id` is `None` only for parse errors, where the request identifier
/// could not be recovered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version
    pub jsonrpc: JsonRpcVersion,
    /// Response payload (either result or error, never both)
    #[serde(flatten)]
    pub payload: JsonRpcResponsePayload,
    /// Request identifier (null for parse errors)
    pub id: Option<RequestId>,
}

impl JsonRpcResponse {
    /// Build a success response.
    pub fn success(result: Value, id: RequestId) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            payload: JsonRpcResponsePayload::Success { result },
            id: Some(id),
        }
    }

    /// Build an error response.
    pub fn error(error: JsonRpcError, id: Option<RequestId>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            payload: JsonRpcResponsePayload::Error { error },
            id,
        }
    }

    /// Result value, if this is a success response.
    pub fn result(&self) -> Option<&Value> {
        match &self.payload {
            JsonRpcResponsePayload::Success { result } => Some(result),
            JsonRpcResponsePayload::Error { .. } => None,
        }
    }

    /// Error object, if this is an error response.
    pub fn rpc_error(&self) -> Option<&JsonRpcError> {
        match &self.payload {
            JsonRpcResponsePayload::Success { .. } => None,
            JsonRpcResponsePayload::Error { error } => Some(error),
        }
    }

    /// Consume the response, yielding the result or the error.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match self.payload {
            JsonRpcResponsePayload::Success { result } => Ok(result),
            JsonRpcResponsePayload::Error { error } => Err(error),
        }
    }
}

/// Standard JSON-RPC error codes used by the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonRpcErrorCode {
    /// Parse error (-32700)
    ParseError,
    /// Invalid request (-32600)
    InvalidRequest,
    /// Method not found (-32601)
    MethodNotFound,
    /// Invalid params (-32602)
    InvalidParams,
    /// Internal error (-32603)
    InternalError,
    /// Server error (-32000): resolution, mediation, and transport failures
    ServerError,
}

impl JsonRpcErrorCode {
    /// Numeric error code.
    pub fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ServerError => -32000,
        }
    }

    /// Default message for the code.
    pub fn message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::ServerError => "Server error",
        }
    }
}

/// Whether a raw body is a JSON-RPC batch (a top-level array).
pub fn is_batch(body: &str) -> bool {
    body.trim_start().starts_with('[')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn version_round_trip() {
        let v = serde_json::to_string(&JsonRpcVersion).unwrap();
        assert_eq!(v, "\"2.0\"");
        let back: JsonRpcVersion = serde_json::from_str("\"2.0\"").unwrap();
        assert_eq!(back, JsonRpcVersion);
        assert!(serde_json::from_str::<JsonRpcVersion>("\"1.0\"").is_err());
    }

    #[test]
    fn request_serialization_shape() {
        let req = JsonRpcRequest::new("tools/call", json!({"name": "ping"}), 7);
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(
            v,
            json!({"jsonrpc": "2.0", "method": "tools/call", "params": {"name": "ping"}, "id": 7})
        );
    }

    #[test]
    fn request_without_params_omits_field() {
        let req = JsonRpcRequest::without_params("tools/list", 1);
        let s = serde_json::to_string(&req).unwrap();
        assert!(!s.contains("params"));
    }

    #[test]
    fn response_payload_is_mutually_exclusive() {
        let ok = JsonRpcResponse::success(json!({"x": 1}), RequestId::Number(1));
        assert!(ok.result().is_some());
        assert!(ok.rpc_error().is_none());

        let err = JsonRpcResponse::error(JsonRpcError::new(-32601, "nope"), Some(1.into()));
        assert!(err.result().is_none());
        assert_eq!(err.rpc_error().unwrap().code, -32601);
    }

    #[test]
    fn parse_error_response_has_null_id() {
        let resp = JsonRpcResponse::error(JsonRpcError::new(-32700, "Parse error"), None);
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["id"], Value::Null);
    }

    #[test]
    fn response_deserializes_from_upstream_wire_form() {
        let resp: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":3,"result":{"tools":[]}}"#).unwrap();
        assert_eq!(resp.id, Some(RequestId::Number(3)));
        assert_eq!(resp.result().unwrap()["tools"], json!([]));

        let err: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":"a","error":{"code":-32000,"message":"boom"}}"#,
        )
        .unwrap();
        assert_eq!(err.rpc_error().unwrap().message, "boom");
    }

    #[test]
    fn string_and_number_ids() {
        let a: RequestId = serde_json::from_str("42").unwrap();
        assert_eq!(a, RequestId::Number(42));
        let b: RequestId = serde_json::from_str("\"req-1\"").unwrap();
        assert_eq!(b, RequestId::String("req-1".into()));
    }

    #[test]
    fn batch_detection() {
        assert!(is_batch("  [{\"jsonrpc\":\"2.0\"}]"));
        assert!(!is_batch("{\"jsonrpc\":\"2.0\"}"));
    }

    #[test]
    fn error_codes() {
        assert_eq!(JsonRpcErrorCode::ParseError.code(), -32700);
        assert_eq!(JsonRpcErrorCode::InvalidRequest.code(), -32600);
        assert_eq!(JsonRpcErrorCode::MethodNotFound.code(), -32601);
        assert_eq!(JsonRpcErrorCode::ServerError.code(), -32000);
    }
}
