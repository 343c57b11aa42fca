//! WebSocket subscriber handling.
//!
//! Every accepted socket becomes one registry entry. Incoming text frames are
//! relayed verbatim to all registered clients, including the sender itself
//! (the dashboard relies on the echo to confirm its own messages round-trip).

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info};

use super::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle one WebSocket connection for its full lifetime.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut handle = state.registry.register().await;
    let connection_id = handle.id;
    info!("New WebSocket connection: {}", connection_id);

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Writer task: drain the registry channel into the socket.
    let send_task = tokio::spawn(async move {
        while let Some(text) = handle.outbound.recv().await {
            if ws_sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                // Peer relay: forward verbatim to everyone, sender included.
                let delivered = state.registry.broadcast(&text).await;
                debug!(
                    "Relayed message from {} to {} clients",
                    connection_id, delivered
                );
            }
            Ok(Message::Binary(_)) => {
                debug!("Ignoring binary frame from {}", connection_id);
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // Pings are answered by axum automatically.
            }
            Ok(Message::Close(_)) => {
                info!("Client {} requested close", connection_id);
                break;
            }
            Err(e) => {
                error!("WebSocket error for {}: {}", connection_id, e);
                break;
            }
        }
    }

    send_task.abort();
    state.registry.unregister(connection_id).await;
    info!("WebSocket connection closed: {}", connection_id);
}
