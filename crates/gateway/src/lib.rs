//! HTTP and WebSocket gateway for parley.
//!
//! Transport adapters over the agent's two entry points:
//!
//! - `GET  /ws/chat`       - WebSocket, one streamed reply per inbound message
//! - `POST /api/chat`      - streamed `text/plain` reply
//! - `POST /chat`          - blocking reply as `{response}`
//! - `GET  /tools`         - registered tool names
//! - `GET  /tools/{name}`  - tool documentation
//! - `POST /tool/{name}`   - invoke a tool
//! - `GET  /health`        - provider initialization status
//!
//! Built on Axum.

pub mod chat;
pub mod ws;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use parley_agent::{Agent, CompletionDriver};
use parley_config::AppConfig;
use parley_core::error::ToolError;
use parley_providers::OpenAiCompatProvider;
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: AppConfig,

    /// Process-wide agent used by the unary endpoints. WebSocket
    /// connections fork their own session from it.
    pub agent: Arc<Agent>,

    /// Where the shared agent's conversation is saved. `None` disables
    /// persistence.
    pub state_file: Option<PathBuf>,
}

impl GatewayState {
    pub fn new(config: AppConfig, agent: Agent) -> Self {
        Self {
            config,
            agent: Arc::new(agent),
            state_file: None,
        }
    }

    pub fn with_state_file(mut self, path: PathBuf) -> Self {
        self.state_file = Some(path);
        self
    }

    /// Save the shared conversation. Failures are logged, never returned.
    pub fn persist(&self) {
        if let Some(path) = &self.state_file {
            if let Err(e) = self.agent.save_state(path) {
                warn!(path = %path.display(), error = %e, "Failed to save conversation state");
            }
        }
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ws/chat", get(ws::ws_handler))
        .route("/api/chat", post(chat::stream_chat_handler))
        .route("/chat", post(chat::chat_handler))
        .route("/tools", get(list_tools_handler))
        .route("/tools/{name}", get(describe_tool_handler))
        .route("/tool/{name}", post(execute_tool_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(cors_layer(&state.config.gateway.allowed_origins))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Any origin when `origins` is empty, otherwise exactly the listed ones.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(parsed))
}

/// Assemble the shared agent from configuration.
pub fn build_agent(config: &AppConfig) -> Agent {
    let provider = Arc::new(OpenAiCompatProvider::from_config(config));
    let tools = parley_tools::default_registry(&config.tools);
    let driver = CompletionDriver::from_config(provider, config);
    Agent::from_config(driver, tools, config)
}

/// Start the gateway HTTP server.
///
/// Loads the saved conversation before serving, and saves it again when
/// the server shuts down on Ctrl-C.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let agent = build_agent(&config);
    if !agent.driver().provider().is_configured() {
        warn!("No API key configured, chat endpoints will report errors");
    }

    let state_file = config.storage.state_file();
    if agent.load_state(&state_file) {
        info!(path = %state_file.display(), exchanges = agent.store().len(), "Restored conversation state");
    }

    let state = Arc::new(GatewayState::new(config, agent).with_state_file(state_file));
    let app = build_router(state.clone());

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.persist();
    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Require the configured API key header on every route except `/health`.
async fn auth_middleware(
    State(state): State<SharedState>,
    req: axum::extract::Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config.gateway.api_key.as_deref() else {
        return next.run(req).await;
    };

    if req.uri().path() == "/health" {
        return next.run(req).await;
    }

    let provided = req
        .headers()
        .get(state.config.gateway.api_key_header.as_str())
        .and_then(|v| v.to_str().ok());

    if provided == Some(expected) {
        return next.run(req).await;
    }

    warn!(path = %req.uri().path(), "Unauthorized request, missing or invalid API key");
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "Invalid or missing API key" })),
    )
        .into_response()
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    provider: &'static str,
    version: &'static str,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    let (status, provider) = if state.agent.driver().provider().is_configured() {
        ("healthy", "initialized")
    } else {
        ("degraded", "not initialized")
    };
    Json(HealthResponse {
        status,
        provider,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn list_tools_handler(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(json!({ "tools": state.agent.list_tools() }))
}

async fn describe_tool_handler(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Response {
    match state.agent.describe_tool(&name) {
        Ok(info) => Json(info).into_response(),
        Err(e) => (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

/// Tool failures are reported in the payload, never as transport errors.
async fn execute_tool_handler(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Json<serde_json::Value> {
    let arguments = if body.iter().all(u8::is_ascii_whitespace) {
        json!({})
    } else {
        match serde_json::from_slice::<serde_json::Value>(&body) {
            Ok(value) if value.is_object() => value,
            Ok(_) => return Json(json!({ "error": "Tool arguments must be a JSON object" })),
            Err(e) => return Json(json!({ "error": format!("Invalid tool arguments: {e}") })),
        }
    };

    match state.agent.execute_tool(&name, arguments).await {
        Ok(result) => Json(json!({ "result": result })),
        Err(e) => {
            if !matches!(e, ToolError::NotFound(_)) {
                warn!(tool = %name, error = %e, "Tool execution failed");
            }
            Json(json!({ "error": e.to_string() }))
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn json_body(response: Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_initialized_provider() {
        let app = build_router(state(vec!["ok"]));
        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["provider"], "initialized");
    }

    #[tokio::test]
    async fn health_reports_degraded_provider() {
        let app = build_router(state_with(AppConfig::default(), vec![], true));
        let body = json_body(app.oneshot(get("/health")).await.unwrap()).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["provider"], "not initialized");
    }

    #[tokio::test]
    async fn lists_tools() {
        let app = build_router(state(vec![]));
        let body = json_body(app.oneshot(get("/tools")).await.unwrap()).await;
        assert_eq!(body, json!({ "tools": ["double"] }));
    }

    #[tokio::test]
    async fn describes_tool_or_404() {
        let app = build_router(state(vec![]));
        let response = app.clone().oneshot(get("/tools/double")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["documentation"], "Doubles x");
        assert_eq!(body["is_async"], false);

        let response = app.oneshot(get("/tools/ghost")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn executes_tool() {
        let app = build_router(state(vec![]));
        let response = app
            .oneshot(post_json("/tool/double", json!({ "x": 21 })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "result": 42 }));
    }

    #[tokio::test]
    async fn tool_failures_are_payloads() {
        let app = build_router(state(vec![]));

        let response = app
            .clone()
            .oneshot(post_json("/tool/nonexistent_tool", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({ "error": "Tool not found: nonexistent_tool" })
        );

        let response = app
            .clone()
            .oneshot(post_json("/tool/double", json!({ "x": "nope" })))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("x must be an integer"));

        let req = Request::builder()
            .method("POST")
            .uri("/tool/double")
            .body(Body::from("{broken"))
            .unwrap();
        let body = json_body(app.oneshot(req).await.unwrap()).await;
        assert!(body["error"].as_str().unwrap().starts_with("Invalid tool arguments"));
    }

    #[tokio::test]
    async fn api_key_required_when_configured() {
        let mut config = AppConfig::default();
        config.gateway.api_key = Some("secret".into());
        let app = build_router(state_with(config, vec![], false));

        let response = app.clone().oneshot(get("/tools")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let req = Request::builder()
            .uri("/tools")
            .header("X-API-Key", "secret")
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.clone().oneshot(req).await.unwrap().status(), StatusCode::OK);

        // Health stays public
        assert_eq!(app.oneshot(get("/health")).await.unwrap().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn cors_allows_any_origin_by_default() {
        let app = build_router(state(vec![]));
        let req = Request::builder()
            .uri("/health")
            .header("origin", "http://localhost:3000")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn ws_route_exists() {
        let app = build_router(state(vec![]));
        let response = app.oneshot(get("/ws/chat")).await.unwrap();
        // Without upgrade headers the extractor rejects, but the route is there
        assert_ne!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn persist_writes_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage").join("state.json");
        let state = GatewayState::new(AppConfig::default(), agent(vec![], false))
            .with_state_file(path.clone());
        state.agent.store().set_context("k", json!(1));
        state.persist();
        assert!(path.exists());
    }
}
