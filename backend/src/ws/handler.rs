use axum::{
    extract::{ws, State, WebSocketUpgrade},
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::AppState;
use crate::cache::CacheEvent;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    Connected { message: String },
    Ping,
    Pong,
    /// A cached query was dropped; clients refetch anything under `key`.
    Invalidated { key: Vec<String>, removed: usize },
    Session { signed_in: bool },
}

impl From<CacheEvent> for WsMessage {
    fn from(event: CacheEvent) -> Self {
        match event {
            CacheEvent::Invalidated { key, removed } => WsMessage::Invalidated { key, removed },
        }
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn send<S>(sender: &mut S, message: &WsMessage) -> bool
where
    S: SinkExt<ws::Message> + Unpin,
{
    let Ok(text) = serde_json::to_string(message) else {
        return false;
    };
    sender.send(ws::Message::Text(text)).await.is_ok()
}

async fn handle_socket(socket: ws::WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut cache_events = state.raffle_manager.cache().subscribe();
    let mut session_changes = state.session.subscribe();

    let welcome = WsMessage::Connected {
        message: "Connected to Raffle Storefront WebSocket".to_string(),
    };
    if !send(&mut sender, &welcome).await {
        return;
    }

    loop {
        tokio::select! {
            msg = receiver.next() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    ws::Message::Text(text) => {
                        tracing::debug!("Received WebSocket message: {}", text);
                        if let Ok(WsMessage::Ping) = serde_json::from_str::<WsMessage>(&text) {
                            if !send(&mut sender, &WsMessage::Pong).await {
                                break;
                            }
                        }
                    }
                    ws::Message::Close(_) => {
                        tracing::info!("WebSocket connection closed");
                        break;
                    }
                    _ => {}
                }
            }
            event = cache_events.recv() => {
                match event {
                    Ok(event) => {
                        if !send(&mut sender, &WsMessage::from(event)).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("WebSocket client lagged, {} cache events skipped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            changed = session_changes.changed() => {
                if changed.is_err() {
                    break;
                }
                // the user id stays private to bearer-checked routes
                let signed_in = session_changes.borrow_and_update().is_some();
                let message = WsMessage::Session { signed_in };
                if !send(&mut sender, &message).await {
                    break;
                }
            }
        }
    }
}
