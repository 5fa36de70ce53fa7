//! REST facade: human-facing catalog renderings and call routes.
//!
//! Call arguments are assembled from the query string, a form body, or a
//! JSON body; scalar query/form values are coerced number-first, then bool,
//! then string. `?native=true` (or the `X-Native-Tool-Call` header) returns
//! the raw structured result instead of flattened text.

use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde_json::{json, Map, Value};

use super::{detached, openapi::openapi_document, render, AppState, NATIVE_HEADER};
use crate::dispatch::synthesized_prompt;
use crate::error::{ProxyError, ResolveError};
use crate::registry::qualified;

/// Liveness probe.
pub async fn healthz() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Upstream summary: names, commands/URLs, capability counts.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({"servers": state.registry.status()}))
}

/// Plain-text tool catalog.
pub async fn tools_plain(State(state): State<AppState>) -> impl IntoResponse {
    plain(render::render_plain(&state.registry.aggregated_tools()))
}

/// JSON tool catalog.
pub async fn tools_json(State(state): State<AppState>) -> impl IntoResponse {
    let tools = state.registry.aggregated_tools();
    Json(json!({"count": tools.len(), "tools": tools}))
}

/// One-line-per-tool catalog.
pub async fn tools_simple(State(state): State<AppState>) -> impl IntoResponse {
    plain(render::render_simple(&state.registry.aggregated_tools()))
}

/// Grouped catalog with cleaned descriptions.
pub async fn tools_quiet(State(state): State<AppState>) -> impl IntoResponse {
    plain(render::render_quiet(&state.registry.aggregated_tools()))
}

/// Markdown catalog.
pub async fn tools_markdown(State(state): State<AppState>) -> impl IntoResponse {
    let body = render::render_markdown(&state.registry.aggregated_tools());
    (
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        body,
    )
}

/// OpenAPI 3.1 document synthesized from the current catalog.
pub async fn openapi_json(State(state): State<AppState>) -> impl IntoResponse {
    Json(openapi_document(&state.registry.aggregated_tools()))
}

/// Invoke a tool addressed by a bare (or already qualified) identifier.
pub async fn call_bare(
    State(state): State<AppState>,
    Path(tool): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    call_impl(state, tool, query, headers, body).await
}

/// Invoke a tool addressed by `server` and bare name.
pub async fn call_qualified(
    State(state): State<AppState>,
    Path((server, tool)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    call_impl(state, qualified(&server, &tool), query, headers, body).await
}

async fn call_impl(
    state: AppState,
    ident: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (arguments, native) = match request_arguments(query, &headers, &body) {
        Ok(parsed) => parsed,
        Err(e) => return error_body(&e, false),
    };
    let dispatcher = state.dispatcher.clone();
    let result = detached(async move {
        dispatcher.call_tool(&ident, Value::Object(arguments)).await
    })
    .await;
    match result {
        Some(Ok(outcome)) if native => Json(outcome.raw).into_response(),
        Some(Ok(outcome)) => plain(outcome.text).into_response(),
        Some(Err(e)) => error_body(&e, native),
        None => internal_error(native),
    }
}

/// Fetch a prompt addressed by a bare identifier.
pub async fn prompt_bare(
    State(state): State<AppState>,
    Path(prompt): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    prompt_impl(state, prompt, query, headers, body).await
}

/// Fetch a prompt addressed by `server` and bare name.
pub async fn prompt_qualified(
    State(state): State<AppState>,
    Path((server, prompt)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    prompt_impl(state, qualified(&server, &prompt), query, headers, body).await
}

async fn prompt_impl(
    state: AppState,
    ident: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (mut arguments, native) = match request_arguments(query, &headers, &body) {
        Ok(parsed) => parsed,
        Err(e) => return error_body(&e, false),
    };
    // A custom prompt short-circuits to a synthesized user-role message
    // without contacting any upstream.
    if let Some(custom) = arguments.remove("custom_prompt") {
        let text = match custom {
            Value::String(s) => s,
            other => other.to_string(),
        };
        return Json(json!(synthesized_prompt(text))).into_response();
    }
    let dispatcher = state.dispatcher.clone();
    let result = detached(async move {
        dispatcher.get_prompt(&ident, Value::Object(arguments)).await
    })
    .await;
    match result {
        Some(Ok(raw)) => Json(raw).into_response(),
        Some(Err(e)) => error_body(&e, native),
        None => internal_error(native),
    }
}

/// Plain-text resource listing.
pub async fn resources_plain(State(state): State<AppState>) -> impl IntoResponse {
    plain(render::render_resources(
        &state.registry.aggregated_resources(),
    ))
}

/// JSON resource listing.
pub async fn resources_json(State(state): State<AppState>) -> impl IntoResponse {
    let resources = state.registry.aggregated_resources();
    Json(json!({"count": resources.len(), "resources": resources}))
}

/// Read one resource; text contents render as plain text, anything else as
/// the raw JSON result.
pub async fn resource_read(
    State(state): State<AppState>,
    Path((server, uri)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let (_, native) = match request_arguments(query, &headers, &Bytes::new()) {
        Ok(parsed) => parsed,
        Err(e) => return error_body(&e, false),
    };
    let ident = qualified(&server, &uri);
    let dispatcher = state.dispatcher.clone();
    let result = detached(async move { dispatcher.read_resource(&ident).await }).await;
    match result {
        Some(Ok(raw)) => {
            if !native {
                let contents = raw.get("contents").and_then(Value::as_array);
                if let Some([only]) = contents.map(Vec::as_slice) {
                    if let Some(text) = only.get("text").and_then(Value::as_str) {
                        return plain(text.to_owned()).into_response();
                    }
                }
            }
            Json(raw).into_response()
        }
        Some(Err(e)) => error_body(&e, native),
        None => internal_error(native),
    }
}

/// Assemble the argument object from query string plus body, and decide
/// whether the caller wants the raw structured result.
fn request_arguments(
    query: Option<String>,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<(Map<String, Value>, bool), ProxyError> {
    let mut arguments = Map::new();
    let mut native = headers
        .get(NATIVE_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));

    if let Some(query) = query {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if key == "native" {
                native = value == "true";
                continue;
            }
            arguments.insert(key.into_owned(), coerce_scalar(&value));
        }
    }

    if body.is_empty() {
        return Ok((arguments, native));
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if content_type.starts_with("application/x-www-form-urlencoded") {
        for (key, value) in url::form_urlencoded::parse(body) {
            if key == "native" {
                native = value == "true";
                continue;
            }
            arguments.insert(key.into_owned(), coerce_scalar(&value));
        }
    } else {
        // JSON body (the default): values are taken as-is, no coercion.
        let parsed: Value = serde_json::from_slice(body)
            .map_err(|e| ProxyError::protocol(format!("invalid JSON body: {e}")))?;
        match parsed {
            Value::Object(map) => arguments.extend(map),
            other => {
                return Err(ProxyError::protocol(format!(
                    "expected a JSON object body, got {other}"
                )));
            }
        }
    }
    Ok((arguments, native))
}

/// Scalar coercion for query and form values: number, then bool, then
/// string.
fn coerce_scalar(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    if let Ok(b) = raw.parse::<bool>() {
        return Value::Bool(b);
    }
    Value::String(raw.to_owned())
}

fn plain(body: String) -> (StatusCode, [(header::HeaderName, &'static str); 1], String) {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
}

fn rest_status(error: &ProxyError) -> StatusCode {
    match error {
        ProxyError::Resolution(ResolveError::NotFound { .. })
        | ProxyError::Resolution(ResolveError::UnknownServer { .. }) => StatusCode::NOT_FOUND,
        ProxyError::Resolution(ResolveError::Ambiguous { .. })
        | ProxyError::Mediation(_)
        | ProxyError::Protocol(_)
        | ProxyError::Configuration(_)
        | ProxyError::Serialization(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_body(error: &ProxyError, native: bool) -> Response {
    let status = rest_status(error);
    let message = error.caller_message();
    if native {
        (status, Json(json!({"error": message}))).into_response()
    } else {
        (status, message).into_response()
    }
}

fn internal_error(native: bool) -> Response {
    let error = ProxyError::transport("dispatch task failed");
    error_body(&error, native)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn scalar_coercion_order() {
        assert_eq!(coerce_scalar("3"), json!(3));
        assert_eq!(coerce_scalar("0.5"), json!(0.5));
        assert_eq!(coerce_scalar("true"), json!(true));
        assert_eq!(coerce_scalar("hello"), json!("hello"));
        // A numeric-looking string stays a number even where a bool would
        // also parse downstream.
        assert_eq!(coerce_scalar("1"), json!(1));
    }

    #[test]
    fn query_arguments_with_native_flag() {
        let (args, native) = request_arguments(
            Some("0=world&1=hi&native=true".to_owned()),
            &HeaderMap::new(),
            &Bytes::new(),
        )
        .unwrap();
        assert!(native);
        assert_eq!(args.get("0"), Some(&json!("world")));
        assert!(!args.contains_key("native"));
    }

    #[test]
    fn json_body_values_are_not_coerced() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        let body = Bytes::from(r#"{"count": "3", "nested": {"a": 1}}"#);
        let (args, _) = request_arguments(None, &headers, &body).unwrap();
        assert_eq!(args.get("count"), Some(&json!("3")));
        assert_eq!(args.get("nested"), Some(&json!({"a": 1})));
    }

    #[test]
    fn form_body_values_are_coerced() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            "application/x-www-form-urlencoded".parse().unwrap(),
        );
        let body = Bytes::from("count=3&flag=true&name=x");
        let (args, _) = request_arguments(None, &headers, &body).unwrap();
        assert_eq!(args.get("count"), Some(&json!(3)));
        assert_eq!(args.get("flag"), Some(&json!(true)));
        assert_eq!(args.get("name"), Some(&json!("x")));
    }

    #[test]
    fn native_header_is_honored() {
        let mut headers = HeaderMap::new();
        headers.insert(NATIVE_HEADER, "true".parse().unwrap());
        let (_, native) = request_arguments(None, &headers, &Bytes::new()).unwrap();
        assert!(native);
    }

    #[test]
    fn non_object_json_body_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        let err = request_arguments(None, &headers, &Bytes::from("[1,2]")).unwrap_err();
        assert!(matches!(err, ProxyError::Protocol(_)));
    }
}
