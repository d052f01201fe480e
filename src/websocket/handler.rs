use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    middleware::AuthUser,
    state::AppState,
    websocket::types::{ClientMessage, ErrorPayload, MessageReadPayload, WsMessage},
};

use super::connection::WsSender;

/// Real-time session for the authenticated user.
///
/// Server frames are `message_created` events for every message the user
/// receives or sends, plus keep-alive pings. Clients may mark messages read
/// over the same socket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

async fn handle_socket(socket: WebSocket, user_id: Uuid, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

    let connection_id = state.ws_connections.add_connection(user_id, tx.clone());
    tracing::info!(user_id = %user_id, connection_id = %connection_id, "WebSocket opened");

    // Task: send messages from channel to WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    // Task: receive messages from WebSocket
    let state_clone = state.clone();
    let tx_clone = tx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if let Err(e) = process_client_message(&text, user_id, &state_clone, &tx_clone).await {
                        tracing::warn!(user_id = %user_id, "Error processing client message: {}", e);
                        let _ = tx_clone.send(WsMessage::Error(ErrorPayload {
                            message: e.to_string(),
                        }));
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Heartbeat task
    let tx_heartbeat = tx.clone();
    let mut heartbeat_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
        loop {
            interval.tick().await;
            if tx_heartbeat.send(WsMessage::Ping).is_err() {
                break;
            }
        }
    });

    // Stop all tasks when any one finishes
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
            heartbeat_task.abort();
        },
        _ = &mut recv_task => {
            send_task.abort();
            heartbeat_task.abort();
        },
        _ = &mut heartbeat_task => {
            send_task.abort();
            recv_task.abort();
        }
    }

    state.ws_connections.remove_connection(&user_id, connection_id);
    tracing::info!(
        user_id = %user_id,
        connection_id = %connection_id,
        still_online = state.ws_connections.is_online(&user_id),
        "WebSocket closed"
    );
}

async fn process_client_message(
    text: &str,
    user_id: Uuid,
    state: &AppState,
    tx: &WsSender,
) -> Result<()> {
    let client_msg: ClientMessage = serde_json::from_str(text)
        .map_err(|e| AppError::BadRequest(format!("Invalid message format: {}", e)))?;

    match client_msg {
        ClientMessage::MarkMessageRead { message_id } => {
            state.message_service.mark_read(user_id, message_id).await?;
            let _ = tx.send(WsMessage::MessageRead(MessageReadPayload { message_id }));
        }
        ClientMessage::Ping => {
            let _ = tx.send(WsMessage::Pong);
        }
    }

    Ok(())
}
