use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;

use crate::{
    error::{AppError, Result},
    state::AppState,
    websocket::types::{ViewMessage, WorkerMessage},
};

use super::connection::ViewSender;

/// WebSocket upgrade handler for views
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an individual view connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ViewMessage>();

    let view_id = state.ws_connections.add_view(tx.clone());
    // Ask the new view for any timers it has persisted on its side.
    state.worker.view_attached(&view_id);

    // Spawn task to send messages from channel to WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    // Spawn task to receive messages from WebSocket
    let state_clone = state.clone();
    let tx_clone = tx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Err(e) = process_view_message(&text, &state_clone, &tx_clone).await {
                    tracing::error!("Error processing view message: {:?}", e);
                    let error_msg = ViewMessage::Error {
                        message: e.to_string(),
                    };
                    let _ = tx_clone.send(error_msg);
                }
            } else if let Message::Close(_) = msg {
                break;
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.ws_connections.remove_view(&view_id);
    tracing::info!("View connection {} closed", view_id);
}

/// Process incoming view messages
async fn process_view_message(text: &str, state: &AppState, tx: &ViewSender) -> Result<()> {
    let message: WorkerMessage = serde_json::from_str(text)
        .map_err(|e| AppError::BadRequest(format!("Invalid message format: {}", e)))?;

    tracing::debug!("View message: {:?}", message);
    if let Some(reply) = state.worker.handle(message).await? {
        let _ = tx.send(reply);
    }

    Ok(())
}
