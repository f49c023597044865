//! WebSocket event stream
//!
//! `GET /ws?game_id=..&room_id=..` streams engine events as JSON text frames.
//! Both filters are optional; with neither set every event is delivered.

use super::handlers::AppState;
use crate::events::GameEvent;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Client-side filter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WsSubscription {
    #[serde(default)]
    pub game_id: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
}

impl WsSubscription {
    pub fn matches(&self, event: &GameEvent) -> bool {
        let game_ok = self.game_id.as_deref().map_or(true, |id| id == event.game_id());
        let room_ok = self.room_id.as_deref().map_or(true, |id| id == event.room_id());
        game_ok && room_ok
    }
}

/// GET /ws
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(subscription): Query<WsSubscription>,
) -> Response {
    let events = state.service.subscribe();
    ws.on_upgrade(move |socket| handle_connection(socket, events, subscription))
}

async fn handle_connection(
    socket: WebSocket,
    mut events: broadcast::Receiver<GameEvent>,
    subscription: WsSubscription,
) {
    let client_id = Uuid::new_v4().to_string();
    info!(
        client_id = %client_id,
        game_id = ?subscription.game_id,
        room_id = ?subscription.room_id,
        "WebSocket client connected"
    );

    let (mut sender, mut receiver) = socket.split();

    let recv_client = client_id.clone();
    let mut receive_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(Message::Text(text)) => {
                    debug!(client_id = %recv_client, %text, "Ignoring client message");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(client_id = %recv_client, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    let send_client = client_id.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(client_id = %send_client, skipped, "WebSocket client lagging, events dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if !subscription.matches(&event) {
                continue;
            }

            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Failed to serialize event");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut receive_task => send_task.abort(),
        _ = &mut send_task => receive_task.abort(),
    }

    info!(client_id = %client_id, "WebSocket client disconnected");
}
