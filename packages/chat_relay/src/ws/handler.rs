//! WebSocket Handler
//!
//! Main multiplexed WebSocket connection handler.

use axum::extract::ws::{Message, WebSocket};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::registry::Registry;

use super::dispatch::{ConnectionContext, handle_text};
use super::protocol::ServerMessage;

/// Handle a multiplexed WebSocket connection
pub async fn handle_multiplexed_ws(socket: WebSocket, registry: Arc<Registry>) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    info!(connection = %connection_id, "New WebSocket connection");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Channel for sending messages to the WebSocket
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(100);

    let ctx = ConnectionContext {
        connection_id: connection_id.clone(),
        tx,
        registry,
        cancel: CancellationToken::new(),
    };
    let cancel = ctx.cancel.clone();

    // Task to send messages to WebSocket
    let sender_task = async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    };

    // Task to handle incoming messages
    let input_task = async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    handle_text(&ctx, text.as_str()).await;
                }
                Ok(Message::Close(_)) => {
                    debug!("Client closed connection");
                    break;
                }
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    };

    tokio::select! {
        _ = sender_task => debug!("Sender task ended"),
        _ = input_task => debug!("Input task ended"),
    }

    // Abandon this connection's answers; their sessions drop back to Idle
    cancel.cancel();

    info!(connection = %connection_id, "WebSocket connection closed");
}
