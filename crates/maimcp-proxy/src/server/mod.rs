//! Downstream HTTP surfaces: the MCP JSON-RPC endpoint and the REST facade.
//!
//! One axum router carries both. Every route sits behind a permissive CORS
//! layer (`*` origin, GET/POST/OPTIONS, explicit header allow-list);
//! preflight OPTIONS requests are answered by the layer with 200 and no
//! body.

pub mod mcp;
pub mod openapi;
pub mod render;
pub mod rest;

use std::future::Future;
use std::sync::{Arc, OnceLock};

use axum::http::{header, HeaderName, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::dispatch::Dispatcher;
use crate::registry::Registry;

/// Header carrying the process-wide session identifier on MCP responses.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Header forcing raw structured results on the REST call routes.
pub const NATIVE_HEADER: &str = "x-native-tool-call";

/// Shared state of both facades.
#[derive(Clone)]
pub struct AppState {
    /// Upstream registry
    pub registry: Arc<Registry>,
    /// Dispatch core
    pub dispatcher: Arc<Dispatcher>,
    session: Arc<OnceLock<String>>,
}

impl AppState {
    /// Assemble the shared state.
    pub fn new(registry: Arc<Registry>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            registry,
            dispatcher,
            session: Arc::new(OnceLock::new()),
        }
    }

    /// The process-wide session identifier, assigned on first use.
    pub fn session_id(&self) -> &str {
        self.session.get_or_init(|| Uuid::new_v4().to_string())
    }
}

/// Build the downstream router: MCP endpoint at `/`, REST facade beside it.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(mcp::handle))
        .route("/healthz", get(rest::healthz))
        .route("/status", get(rest::status))
        .route("/tools", get(rest::tools_plain))
        .route("/tools/json", get(rest::tools_json))
        .route("/tools/simple", get(rest::tools_simple))
        .route("/tools/quiet", get(rest::tools_quiet))
        .route("/tools/markdown", get(rest::tools_markdown))
        .route("/call/{tool}", get(rest::call_bare).post(rest::call_bare))
        .route(
            "/call/{server}/{tool}",
            get(rest::call_qualified).post(rest::call_qualified),
        )
        .route(
            "/tools/{server}/{tool}",
            get(rest::call_qualified).post(rest::call_qualified),
        )
        .route(
            "/prompts/{prompt}",
            get(rest::prompt_bare).post(rest::prompt_bare),
        )
        .route(
            "/prompts/{server}/{prompt}",
            get(rest::prompt_qualified).post(rest::prompt_qualified),
        )
        .route("/resources", get(rest::resources_plain))
        .route("/resources/json", get(rest::resources_json))
        .route("/resources/{server}/{*uri}", get(rest::resource_read))
        .route("/openapi.json", get(rest::openapi_json))
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(NATIVE_HEADER),
            HeaderName::from_static(SESSION_HEADER),
        ])
}

/// Run `fut` on its own task so a client disconnect cannot cancel the
/// in-flight upstream exchange; the call completes (and is reported) even
/// when nobody is left to read the answer.
pub(crate) async fn detached<T, F>(fut: F) -> Option<T>
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    tokio::spawn(fut).await.ok()
}
