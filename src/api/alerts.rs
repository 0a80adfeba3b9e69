use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use tokio::sync::broadcast;

use super::server::AppState;
use crate::engine::AlertRecord;

// ---------------------------------------------------------------------------
// GET /ws/alerts
// ---------------------------------------------------------------------------

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state.alert_tx.subscribe()))
}

/// Alerts go out as JSON text frames, the same shape `/api/alerts` lists.
fn alert_frame(alert: &AlertRecord) -> Option<Message> {
    match serde_json::to_string(alert) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::warn!("Failed to serialize alert for {}: {e}", alert.display_name());
            None
        }
    }
}

async fn handle_ws(mut socket: WebSocket, mut rx: broadcast::Receiver<AlertRecord>) {
    loop {
        tokio::select! {
            result = rx.recv() => match result {
                Ok(alert) => {
                    let Some(frame) = alert_frame(&alert) else { continue };
                    if socket.send(frame).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Alert stream client lagged, skipped {n} alerts");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = socket.recv() => match msg {
                Some(Ok(Message::Ping(data))) => {
                    if socket.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                _ => {}
            },
        }
    }
}
