//! WebSocket endpoint for realtime notification delivery.
//!
//! Protocol: the first text frame from the client names the recipient this
//! connection serves; every later server-to-client frame is the plain
//! message text of one delivered notification. No further framing.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;

use crate::registry::ConnectionRegistry;

pub fn router() -> Router<Arc<ConnectionRegistry>> {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
}

async fn health_check(State(registry): State<Arc<ConnectionRegistry>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "herald-relay",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": registry.active_connections(),
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(registry): State<Arc<ConnectionRegistry>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, registry))
}

/// Handle one client connection for its whole lifetime.
async fn handle_socket(socket: WebSocket, registry: Arc<ConnectionRegistry>) {
    let (mut sender, mut receiver) = socket.split();

    // Handshake: the first text frame is the recipient identifier.
    let recipient = match receiver.next().await {
        Some(Ok(Message::Text(text))) => text.trim().to_string(),
        _ => return,
    };

    if recipient.is_empty() {
        tracing::warn!("Empty recipient handshake, closing connection");
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle_id = registry.register(&recipient, tx);
    tracing::info!(recipient = %recipient, "Client connected");

    // Push forwarded events out until the channel or the socket closes. The
    // channel closes when a newer connection replaces this one's registry
    // entry.
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sender.send(Message::Text(message.into())).await.is_err() {
                break;
            }
        }
    });

    // Drain inbound frames to observe the close. Frames after the handshake
    // carry no meaning; ping/pong is handled by the protocol layer.
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            match frame {
                Ok(Message::Close(_)) | Err(_) => break,
                _ => {}
            }
        }
    });

    // Either side finishing ends the connection.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // Only drops the entry if this connection still owns it.
    registry.unregister(&recipient, handle_id);
    tracing::info!(recipient = %recipient, "Client disconnected");
}
