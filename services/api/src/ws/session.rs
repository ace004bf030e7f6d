//! Manages WebSocket connection lifecycles for the chat and avatar channels.

use super::{
    protocol::{AvatarEvent, ClientEvent, ServerEvent},
    relay::handle_chat_message,
};
use crate::{
    hub::BroadcastHub,
    models::{ErrorResponse, is_valid_session_id},
    state::{AppState, avatar_group, chat_group},
};
use anyhow::Result;
use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde::Serialize;
use std::{future::Future, sync::Arc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

fn reject(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            success: false,
            message: message.to_string(),
        }),
    )
        .into_response()
}

/// Upgrades `/ws/chat/{session_id}` to a chat connection.
pub async fn chat_ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    if !is_valid_session_id(&session_id) {
        return reject(StatusCode::BAD_REQUEST, "Invalid session id");
    }
    ws.on_upgrade(move |socket| handle_chat_socket(socket, state, session_id))
}

/// Upgrades `/ws/avatar/{session_id}` to an avatar-state relay connection.
pub async fn avatar_ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    if !state.config.features.avatar_integration {
        return reject(StatusCode::NOT_FOUND, "Avatar integration is disabled");
    }
    if !is_valid_session_id(&session_id) {
        return reject(StatusCode::BAD_REQUEST, "Invalid session id");
    }
    ws.on_upgrade(move |socket| handle_avatar_socket(socket, state, session_id))
}

#[instrument(name = "chat_ws", skip_all, fields(%session_id, conn_id = tracing::field::Empty))]
async fn handle_chat_socket(socket: WebSocket, state: Arc<AppState>, session_id: String) {
    let conn_id: u32 = rand::random();
    tracing::Span::current().record("conn_id", conn_id);

    if let Err(e) = state.store.get_or_create_session(&session_id).await {
        warn!(error = ?e, "Could not record session; continuing without persistence");
    }

    let group = chat_group(&session_id);
    serve_socket(socket, &state.chat_hub, &group, |text| {
        let state = Arc::clone(&state);
        let session_id = session_id.clone();
        async move { dispatch_chat_event(&state, &session_id, &text).await }
    })
    .await;
}

#[instrument(name = "avatar_ws", skip_all, fields(%session_id, conn_id = tracing::field::Empty))]
async fn handle_avatar_socket(socket: WebSocket, state: Arc<AppState>, session_id: String) {
    let conn_id: u32 = rand::random();
    tracing::Span::current().record("conn_id", conn_id);

    let group = avatar_group(&session_id);
    serve_socket(socket, &state.avatar_hub, &group, |text| {
        let state = Arc::clone(&state);
        let group = group.clone();
        async move {
            match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(data) => {
                    state
                        .avatar_hub
                        .publish(&group, AvatarEvent::AvatarState { data });
                }
                Err(e) => warn!(error = %e, "Dropping malformed avatar message"),
            }
        }
    })
    .await;
}

/// Runs one connection: joins `group`, forwards group traffic to the socket,
/// and feeds inbound text frames to `on_text` one at a time.
async fn serve_socket<T, F, Fut>(socket: WebSocket, hub: &BroadcastHub<T>, group: &str, on_text: F)
where
    T: Serialize + Clone + Send + Sync + 'static,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = ()>,
{
    let rx = hub.subscribe(group);
    info!(group, subscribers = hub.subscriber_count(group), "WebSocket connected");

    let (socket_tx, socket_rx) = socket.split();
    let forwarder = tokio::spawn(forward_group(rx, socket_tx));

    read_frames(socket_rx, on_text).await;

    forwarder.abort();
    let _ = forwarder.await;
    hub.release(group);
    info!(group, "WebSocket disconnected");
}

async fn read_frames<F, Fut>(mut socket_rx: SplitStream<WebSocket>, mut on_text: F)
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = ()>,
{
    while let Some(frame) = socket_rx.next().await {
        match frame {
            Ok(Message::Text(text)) => on_text(text.to_string()).await,
            Ok(Message::Close(_)) => {
                debug!("Client sent close frame");
                break;
            }
            Ok(Message::Binary(_)) => warn!("Ignoring binary frame"),
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(e) => {
                error!(error = ?e, "Error receiving from client WebSocket");
                break;
            }
        }
    }
}

async fn forward_group<T: Serialize>(
    mut rx: mpsc::UnboundedReceiver<T>,
    mut socket_tx: SplitSink<WebSocket, Message>,
) {
    while let Some(event) = rx.recv().await {
        if let Err(e) = send_msg(&mut socket_tx, &event).await {
            debug!(error = ?e, "Socket closed while forwarding");
            break;
        }
    }
}

async fn dispatch_chat_event(state: &Arc<AppState>, session_id: &str, text: &str) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Dropping malformed client event");
            return;
        }
    };

    match event {
        ClientEvent::ChatMessage { message } => {
            if message.trim().is_empty() {
                debug!("Ignoring empty chat message");
                return;
            }
            handle_chat_message(state, session_id, message).await;
        }
        ClientEvent::VoiceInput { transcription } => {
            if !state.config.features.voice_chat {
                warn!("Voice chat disabled; dropping voice input");
                return;
            }
            if transcription.trim().is_empty() {
                debug!("Ignoring empty transcription");
                return;
            }
            handle_chat_message(state, session_id, transcription).await;
        }
        ClientEvent::GestureTrigger { gesture } => {
            info!(%gesture, "Relaying client gesture");
            state
                .chat_hub
                .publish(&chat_group(session_id), ServerEvent::GestureTrigger { gesture });
        }
    }
}

pub(crate) async fn send_msg<T: Serialize>(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: &T,
) -> Result<()> {
    let serialized = serde_json::to_string(msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
