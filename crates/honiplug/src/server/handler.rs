//! WebSocket Connection Handler
//!
//! Handles individual streaming connections and message processing.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::auth::Identity;

use super::connection::{Connected, StreamConnection};
use super::protocol::{ClientMessage, ErrorCode, ServerMessage};
use super::state::AppState;

/// Handle a streaming connection
pub async fn handle_websocket(socket: WebSocket, state: AppState, identity: Option<Identity>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Channel for sending messages to this client
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(64);

    let session_id = state.register_client(identity.as_ref());

    let connected = ServerMessage::connected(
        session_id.to_string(),
        identity.as_ref().map(|i| i.user_id.clone()),
    );
    if let Ok(json) = serde_json::to_string(&connected) {
        let _ = ws_sender.send(Message::Text(json)).await;
    }

    // Forward messages from the channel to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    // The connection lives in the receive task; dropping it disposes its channels
    let mut connection = StreamConnection::new(identity, state.channels().clone(), tx.clone());
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_client_message(&mut connection, &tx, &text).await;
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        connection.dispose_all();
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.remove_client(session_id);
}

/// Handle a client message
async fn handle_client_message(
    connection: &mut StreamConnection,
    tx: &mpsc::Sender<ServerMessage>,
    text: &str,
) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse client message");
            let _ = tx
                .send(ServerMessage::error(None, ErrorCode::InvalidRequest, "Invalid JSON"))
                .await;
            return;
        }
    };

    match msg {
        ClientMessage::Connect { channel, id, .. } => match connection.connect(&channel, &id) {
            Ok(Connected::Opened) => {
                let _ = tx.send(ServerMessage::ChannelConnected { id, channel }).await;
            }
            Ok(Connected::AlreadyShared) => {}
            Err(e) => {
                tracing::debug!(channel = %channel, error = %e, "Channel connect refused");
                let _ = tx
                    .send(ServerMessage::error(Some(id), e.code(), e.to_string()))
                    .await;
            }
        },
        ClientMessage::Disconnect { id } => {
            connection.disconnect(&id);
        }
        ClientMessage::Ping { id } => {
            let _ = tx.send(ServerMessage::pong(id)).await;
        }
    }
}
