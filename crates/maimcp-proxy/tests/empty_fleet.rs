//! The downstream surfaces must behave even with zero upstreams registered:
//! an empty catalog, well-formed protocol errors, and a live health route.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use maimcp_proxy::mediate::{PermissionCache, ScriptedDecisions};
use maimcp_proxy::{router, AppState, Dispatcher, Registry, ReportSink, RuntimeFlags};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> axum::Router {
    let registry = Arc::new(Registry::new(false));
    let dispatcher = Arc::new(Dispatcher::new(
        registry.clone(),
        Arc::new(PermissionCache::new()),
        Arc::new(ScriptedDecisions::new()),
        Arc::new(ReportSink::new(None)),
        Arc::new(RuntimeFlags::new(false, false, true, false)),
    ));
    router(AppState::new(registry, dispatcher))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthz_answers() {
    let response = app()
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "ok"}));
}

#[tokio::test]
async fn empty_catalog_lists_cleanly() {
    let response = app()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/")
                .body(Body::from(
                    json!({"jsonrpc": "2.0", "method": "tools/list", "id": 1}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["result"]["tools"], json!([]));
}

#[tokio::test]
async fn batch_request_is_refused_with_invalid_request() {
    let response = app()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/")
                .body(Body::from("[]"))
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], json!(-32600));
}

#[tokio::test]
async fn unknown_tool_is_not_found() {
    let response = app()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/call/ghost")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn status_lists_no_servers() {
    let response = app()
        .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(response).await, json!({"servers": []}));
}
