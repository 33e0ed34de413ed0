use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::agent::ChatMessage;

const WS_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub model: Option<String>,
    pub messages: Vec<IncomingMessage>,
    pub session_id: Option<String>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub role: String,
    pub content: String,
}

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// One chat turn. Returns a single `RunOutcome` JSON body, or an SSE
/// stream of `AgentEvent`s when `stream` is set. Run-level failures
/// arrive inside those shapes, never as transport errors.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Response> {
    if request.messages.is_empty() {
        return Err(ApiError::BadRequest("messages must not be empty".to_string()));
    }

    let model = request
        .model
        .unwrap_or_else(|| state.default_model.clone());
    let messages: Vec<ChatMessage> = request
        .messages
        .iter()
        .map(|m| ChatMessage {
            role: m.role.clone(),
            content: Some(m.content.clone()),
            tool_call_id: None,
            tool_calls: None,
        })
        .collect();
    let session = request.session_id;
    let route = session.clone();

    if request.stream {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = state.clone();
        tokio::spawn(async move {
            state
                .orchestrator
                .run_streaming(&model, messages, session, route.as_deref(), &tx)
                .await;
        });

        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            let event = rx.recv().await?;
            let sse_event = match Event::default().json_data(&event) {
                Ok(sse_event) => sse_event,
                Err(e) => {
                    warn!("Failed to encode stream event: {}", e);
                    Event::default().data("{}")
                }
            };
            Some((Ok::<_, Infallible>(sse_event), rx))
        });

        Ok(Sse::new(stream)
            .keep_alive(KeepAlive::default())
            .into_response())
    } else {
        let outcome = state
            .orchestrator
            .run(&model, messages, session, route.as_deref())
            .await;
        Ok(Json(outcome).into_response())
    }
}

pub async fn delete_sandbox(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.sandbox.deprovision(&session_id).await?;
    info!("Deleted sandbox {}", session_id);
    Ok(Json(json!({
        "message": format!("Sandbox {} deleted", session_id)
    })))
}

/// Per-session log subscription: LogHub events as JSON text frames,
/// with periodic pings to keep intermediaries from closing the socket.
pub async fn logs_ws(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| stream_logs(socket, state, session_id))
}

async fn stream_logs(socket: WebSocket, state: Arc<AppState>, session_id: String) {
    let mut events = state.logs.subscribe(&session_id);
    let (mut sender, mut receiver) = socket.split();
    let mut keepalive = tokio::time::interval(WS_KEEPALIVE_INTERVAL);
    // The first tick fires immediately; consume it.
    keepalive.tick().await;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let frame = match serde_json::to_string(&event) {
                        Ok(frame) => frame,
                        Err(_) => continue,
                    };
                    if sender.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        "Log subscriber for {} lagged, {} events dropped",
                        session_id, skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = keepalive.tick() => {
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            }
        }
    }
}
