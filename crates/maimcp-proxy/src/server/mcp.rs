//! Downstream MCP endpoint: one POST-only JSON-RPC route.
//!
//! Batches are refused with -32600. Every response, including errors and
//! the 204 acknowledging the `initialized` notification, carries the
//! `Mcp-Session-Id` header.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use maimcp_protocol::{
    jsonrpc::is_batch, JsonRpcError, JsonRpcErrorCode, JsonRpcResponse, RequestId,
    PROTOCOL_VERSION,
};
use serde_json::{json, Value};
use tracing::debug;

use super::{detached, AppState, SESSION_HEADER};
use crate::error::ProxyError;

/// Handle one downstream JSON-RPC request.
pub async fn handle(State(state): State<AppState>, body: Bytes) -> Response {
    let text = String::from_utf8_lossy(&body);
    if is_batch(&text) {
        return error_response(
            &state,
            JsonRpcErrorCode::InvalidRequest.code(),
            "batch requests are not supported",
            None,
        );
    }
    let value: Value = match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(e) => {
            return error_response(
                &state,
                JsonRpcErrorCode::ParseError.code(),
                &format!("invalid JSON: {e}"),
                None,
            );
        }
    };
    let id: Option<RequestId> = value
        .get("id")
        .and_then(|v| serde_json::from_value(v.clone()).ok());
    let Some(method) = value.get("method").and_then(Value::as_str) else {
        return error_response(
            &state,
            JsonRpcErrorCode::InvalidRequest.code(),
            "missing method",
            id,
        );
    };
    let params = value.get("params").cloned().unwrap_or(json!({}));
    debug!(%method, "mcp request");

    match method {
        "initialize" => {
            let protocol_version = params
                .get("protocolVersion")
                .and_then(Value::as_str)
                .unwrap_or(PROTOCOL_VERSION);
            let mut capabilities = json!({"tools": {}, "resources": {}});
            if !state.registry.skip_prompts() {
                capabilities["prompts"] = json!({});
            }
            success_response(
                &state,
                json!({
                    "protocolVersion": protocol_version,
                    "capabilities": capabilities,
                    "serverInfo": {
                        "name": "maimcp-proxy",
                        "version": env!("CARGO_PKG_VERSION"),
                        "title": "mai MCP aggregating proxy"
                    }
                }),
                id,
            )
        }
        "notifications/initialized" => with_session(&state, StatusCode::NO_CONTENT, None),
        "ping" => success_response(&state, json!({}), id),
        "tools/list" => {
            success_response(&state, json!({"tools": state.registry.aggregated_tools()}), id)
        }
        "prompts/list" => success_response(
            &state,
            json!({"prompts": state.registry.aggregated_prompts()}),
            id,
        ),
        "resources/list" => success_response(
            &state,
            json!({"resources": state.registry.aggregated_resources()}),
            id,
        ),
        "tools/call" => {
            let Some(name) = params.get("name").and_then(Value::as_str).map(str::to_owned)
            else {
                return error_response(
                    &state,
                    JsonRpcErrorCode::InvalidParams.code(),
                    "tools/call needs a name",
                    id,
                );
            };
            let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
            let dispatcher = state.dispatcher.clone();
            let result =
                detached(async move { dispatcher.call_tool(&name, arguments).await }).await;
            match result {
                Some(Ok(outcome)) => success_response(&state, outcome.raw, id),
                Some(Err(e)) => proxy_error_response(&state, &e, id),
                None => error_response(
                    &state,
                    JsonRpcErrorCode::InternalError.code(),
                    "dispatch task failed",
                    id,
                ),
            }
        }
        "prompts/get" | "prompts/apply" => {
            let Some(name) = params.get("name").and_then(Value::as_str).map(str::to_owned)
            else {
                return error_response(
                    &state,
                    JsonRpcErrorCode::InvalidParams.code(),
                    "prompts/get needs a name",
                    id,
                );
            };
            let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
            let dispatcher = state.dispatcher.clone();
            let result =
                detached(async move { dispatcher.get_prompt(&name, arguments).await }).await;
            match result {
                Some(Ok(raw)) => success_response(&state, raw, id),
                Some(Err(e)) => proxy_error_response(&state, &e, id),
                None => error_response(
                    &state,
                    JsonRpcErrorCode::InternalError.code(),
                    "dispatch task failed",
                    id,
                ),
            }
        }
        "resources/read" => {
            let Some(uri) = params.get("uri").and_then(Value::as_str).map(str::to_owned)
            else {
                return error_response(
                    &state,
                    JsonRpcErrorCode::InvalidParams.code(),
                    "resources/read needs a uri",
                    id,
                );
            };
            let dispatcher = state.dispatcher.clone();
            let result = detached(async move { dispatcher.read_resource(&uri).await }).await;
            match result {
                Some(Ok(raw)) => success_response(&state, raw, id),
                Some(Err(e)) => proxy_error_response(&state, &e, id),
                None => error_response(
                    &state,
                    JsonRpcErrorCode::InternalError.code(),
                    "dispatch task failed",
                    id,
                ),
            }
        }
        other => error_response(
            &state,
            JsonRpcErrorCode::MethodNotFound.code(),
            &format!("unknown method '{other}'"),
            id,
        ),
    }
}

fn with_session(state: &AppState, status: StatusCode, body: Option<String>) -> Response {
    let mut response = match body {
        Some(body) => (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        None => status.into_response(),
    };
    if let Ok(value) = state.session_id().parse() {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

fn success_response(state: &AppState, result: Value, id: Option<RequestId>) -> Response {
    let response = JsonRpcResponse::success(result, id.unwrap_or(RequestId::Number(0)));
    let body = serde_json::to_string(&response).unwrap_or_default();
    with_session(state, StatusCode::OK, Some(body))
}

fn error_response(state: &AppState, code: i32, message: &str, id: Option<RequestId>) -> Response {
    let response = JsonRpcResponse::error(JsonRpcError::new(code, message), id);
    let body = serde_json::to_string(&response).unwrap_or_default();
    with_session(state, StatusCode::OK, Some(body))
}

fn proxy_error_response(state: &AppState, error: &ProxyError, id: Option<RequestId>) -> Response {
    error_response(state, error.rpc_code(), &error.caller_message(), id)
}
