use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use chrono::Utc;
use futures_util::stream::StreamExt;
use tracing::{debug, warn};

use crate::version::VERSION;
use crate::web::AppState;
use crate::web::models::ws_models::{ConnectionAck, WsMessage};

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let ack = WsMessage::ConnectionAck(ConnectionAck {
        server_version: VERSION.to_string(),
        connected_at: Utc::now(),
    });
    if let Ok(json) = serde_json::to_string(&ack) {
        if socket.send(Message::Text(Utf8Bytes::from(json))).await.is_err() {
            warn!("Failed to send connection ack, closing socket.");
            return;
        }
    }

    let mut rx = state.broadcaster.subscribe();
    debug!(sessions = state.broadcaster.session_count(), "Progress subscriber attached.");

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(message) => {
                        let Ok(json) = serde_json::to_string(&message) else {
                            warn!("Failed to serialize progress event.");
                            continue;
                        };
                        if socket.send(Message::Text(Utf8Bytes::from(json))).await.is_err() {
                            break;
                        }
                    }
                    // A slow consumer missed events; the channel stays usable.
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Progress subscriber lagged behind.");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            Some(Ok(msg)) = socket.next() => {
                match msg {
                    Message::Text(t) => {
                        if t == "ping"
                            && socket.send(Message::Text(Utf8Bytes::from("pong"))).await.is_err()
                        {
                            break;
                        }
                    }
                    Message::Ping(p) => {
                        if socket.send(Message::Pong(p)).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            else => break,
        }
    }
    debug!("Progress subscriber detached.");
}
