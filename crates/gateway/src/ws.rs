//! `GET /ws/chat`: bidirectional chat over WebSocket.
//!
//! Protocol:
//! - Client → Server: `{ "message": "...", "context": { ... } }`
//! - Server → Client, per fragment: `{ "message": "...", "type": "assistant", "chunk": true }`
//! - Server → Client, after the last fragment: `{ "type": "assistant", "chunk": false, "end": true }`
//! - Failed reply: `{ "type": "error", "message": "...", "chunk": false }`, then the terminator
//! - Unparseable inbound frame: `{ "type": "error", "message": "..." }`
//!
//! Each connection is its own session. Inbound messages are handled one
//! at a time; anything received while a reply is streaming is queued, up
//! to [`MAX_QUEUED_MESSAGES`]. Beyond that, messages are dropped and the
//! client gets an error frame.

use std::collections::VecDeque;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{
        State,
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use parley_agent::{Agent, Fragment, render_error};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::SharedState;
use crate::chat::ChatRequest;

/// Inbound messages held while a reply is streaming.
pub const MAX_QUEUED_MESSAGES: usize = 16;

/// One outbound WebSocket frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(rename = "type")]
    pub kind: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<bool>,
}

impl OutboundFrame {
    pub fn chunk(text: impl Into<String>) -> Self {
        Self {
            message: Some(text.into()),
            kind: "assistant",
            chunk: Some(true),
            end: None,
        }
    }

    pub fn end() -> Self {
        Self {
            message: None,
            kind: "assistant",
            chunk: Some(false),
            end: Some(true),
        }
    }

    /// A reply that failed part way.
    pub fn stream_error(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            kind: "error",
            chunk: Some(false),
            end: None,
        }
    }

    /// An inbound frame that could not be handled.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            kind: "error",
            chunk: None,
            end: None,
        }
    }

    pub fn from_fragment(fragment: Fragment) -> Self {
        match fragment {
            Fragment::Text(text) => Self::chunk(text),
            Fragment::Error(e) => Self::stream_error(render_error(&e)),
        }
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn send_frame(socket: &mut WebSocket, frame: &OutboundFrame) -> bool {
    let json = serde_json::to_string(frame).unwrap_or_default();
    socket.send(WsMessage::Text(json.into())).await.is_ok()
}

/// What an inbound WebSocket message means for the session.
enum Inbound {
    Text(String),
    Ignore,
    Closed,
}

fn classify(msg: Option<Result<WsMessage, axum::Error>>) -> Inbound {
    match msg {
        Some(Ok(WsMessage::Text(text))) => Inbound::Text(text.as_str().to_owned()),
        Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => Inbound::Closed,
        Some(Ok(_)) => Inbound::Ignore, // binary, ping, pong
    }
}

async fn handle_ws_connection(mut socket: WebSocket, state: SharedState) {
    let session = state.agent.fork_session();
    let heartbeat = Duration::from_secs(state.config.gateway.heartbeat_interval_secs.max(1));
    let mut queued: VecDeque<String> = VecDeque::with_capacity(MAX_QUEUED_MESSAGES);

    info!("WebSocket connection established");

    loop {
        let text = match queued.pop_front() {
            Some(text) => text,
            None => {
                let msg = tokio::select! {
                    msg = socket.recv() => msg,
                    _ = tokio::time::sleep(heartbeat) => {
                        if socket.send(WsMessage::Ping(Bytes::new())).await.is_err() {
                            break;
                        }
                        continue;
                    }
                };
                match classify(msg) {
                    Inbound::Text(text) => text,
                    Inbound::Ignore => continue,
                    Inbound::Closed => break,
                }
            }
        };

        let request: ChatRequest = match serde_json::from_str(&text) {
            Ok(r) => r,
            Err(e) => {
                let frame = OutboundFrame::rejected(format!("Invalid message: {e}"));
                if !send_frame(&mut socket, &frame).await {
                    break;
                }
                continue;
            }
        };

        if !stream_reply(&mut socket, &session, request, &mut queued).await {
            break;
        }
    }

    info!("WebSocket connection closed");
}

/// Relay one reply. Returns `false` once the client is gone.
///
/// While the reply streams, the socket is still read so a disconnect
/// cancels the provider call; text frames that arrive meanwhile are queued.
async fn stream_reply(
    socket: &mut WebSocket,
    session: &Agent,
    request: ChatRequest,
    queued: &mut VecDeque<String>,
) -> bool {
    let cancel = CancellationToken::new();
    let mut fragments =
        session.process_stream_with_cancel(&request.message, request.context, cancel.clone());

    loop {
        tokio::select! {
            fragment = fragments.recv() => {
                let Some(fragment) = fragment else { break };
                if !send_frame(socket, &OutboundFrame::from_fragment(fragment)).await {
                    cancel.cancel();
                    return false;
                }
            }
            msg = socket.recv() => match classify(msg) {
                Inbound::Text(text) if queued.len() < MAX_QUEUED_MESSAGES => queued.push_back(text),
                Inbound::Text(_) => {
                    warn!(limit = MAX_QUEUED_MESSAGES, "WebSocket queue full, dropping message");
                    let frame = OutboundFrame::rejected(format!(
                        "Too many pending messages (limit {MAX_QUEUED_MESSAGES}), message dropped"
                    ));
                    if !send_frame(socket, &frame).await {
                        cancel.cancel();
                        return false;
                    }
                }
                Inbound::Ignore => {}
                Inbound::Closed => {
                    debug!("Client disconnected mid-reply, cancelling");
                    cancel.cancel();
                    return false;
                }
            }
        }
    }

    send_frame(socket, &OutboundFrame::end()).await
}
