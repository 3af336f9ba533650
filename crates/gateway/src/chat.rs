//! Unary chat endpoints.
//!
//! `POST /api/chat` streams the reply as raw `text/plain` fragments with
//! no framing; `POST /chat` waits for the whole reply.

use std::convert::Infallible;

use axum::{
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use parley_agent::{AgentError, render_error};
use parley_core::exchange::ContextMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

use crate::SharedState;

/// Inbound chat payload, shared with the WebSocket adapter.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub context: ContextMap,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
}

/// `POST /api/chat`: reply body is the concatenation of fragments as they
/// arrive. A failure is rendered inline as the last piece of text.
pub async fn stream_chat_handler(
    State(state): State<SharedState>,
    axum::Json(payload): axum::Json<ChatRequest>,
) -> Response {
    info!(message_len = payload.message.len(), "Streaming chat request");

    let mut fragments = state.agent.process_stream(&payload.message, payload.context);
    let (tx, rx) = mpsc::channel::<Result<String, Infallible>>(32);

    // Dropping the body (client gone) closes `tx`, which stops the relay
    // and, through the dropped receiver, the provider stream.
    tokio::spawn(async move {
        while let Some(fragment) = fragments.recv().await {
            if tx.send(Ok(fragment.render())).await.is_err() {
                break;
            }
        }
        state.persist();
    });

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(ReceiverStream::new(rx)),
    )
        .into_response()
}

/// `POST /chat`: blocking reply.
pub async fn chat_handler(
    State(state): State<SharedState>,
    axum::Json(payload): axum::Json<ChatRequest>,
) -> Response {
    info!(message_len = payload.message.len(), "Chat request");

    let result = state.agent.process(&payload.message, payload.context).await;
    state.persist();

    match result {
        Ok(response) => Json(ChatResponse { response }).into_response(),
        Err(AgentError::Provider(e)) => {
            error!(error = %e, "Chat completion failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": render_error(&e) })),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "Chat processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::build_router;
    use crate::test_support::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use parley_config::AppConfig;
    use serde_json::json;
    use tower::ServiceExt;

    fn post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn streamed_body_is_raw_concatenation() {
        let state = state(vec!["Hel", "lo", "!"]);
        let app = build_router(state.clone());

        let response = app
            .oneshot(post("/api/chat", json!({ "message": "Hello" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
        assert_eq!(body_text(response).await, "Hello!");

        // Recorded on the shared session
        assert_eq!(state.agent.store().window(5)[0].input, "Hello");
    }

    #[tokio::test]
    async fn streamed_failure_is_rendered_inline() {
        let app = build_router(state_with(AppConfig::default(), vec![], true));
        let response = app
            .oneshot(post("/api/chat", json!({ "message": "Hello" })))
            .await
            .unwrap();
        assert_eq!(
            body_text(response).await,
            "Error processing message: Authentication failed: bad key"
        );
    }

    #[tokio::test]
    async fn blocking_chat_returns_response() {
        let state = state(vec!["Hi ", "there"]);
        let app = build_router(state.clone());
        let response = app
            .oneshot(post(
                "/chat",
                json!({ "message": "Hello", "context": { "page": "home" } }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body, json!({ "response": "Hi there" }));

        let exchange = &state.agent.store().window(1)[0];
        assert_eq!(exchange.response.as_deref(), Some("Hi there"));
        assert_eq!(exchange.context["page"], "home");
    }

    #[tokio::test]
    async fn blocking_chat_failure_is_bad_gateway() {
        let app = build_router(state_with(AppConfig::default(), vec![], true));
        let response = app
            .oneshot(post("/chat", json!({ "message": "Hello" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(body["error"].as_str().unwrap().starts_with("Error processing message"));
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected() {
        let app = build_router(state(vec![]));
        let response = app
            .oneshot(post("/chat", json!({ "text": "wrong field" })))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }
}
