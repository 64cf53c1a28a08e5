// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket endpoint for realtime events.
//!
//! Client -> Server (JSON, tagged by `type`):
//! ```json
//! {"type": "join_user", "user_id": "@alice:example.org"}
//! {"type": "join_room", "room_id": "!abc:example.org"}
//! {"type": "leave_room", "room_id": "!abc:example.org"}
//! {"type": "request_sync"}
//! {"type": "trigger_sync", "user_id": "@alice:example.org"}
//! ```
//!
//! Server -> Client:
//! ```json
//! {"event": "new_message", "data": {...}}
//! ```

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::server::GatewayState;

/// Frame sent by a client.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    JoinUser {
        user_id: String,
    },
    JoinRoom {
        room_id: String,
    },
    LeaveRoom {
        room_id: String,
    },
    RequestSync {
        #[serde(default)]
        user_id: Option<String>,
    },
    TriggerSync {
        #[serde(default)]
        user_id: Option<String>,
    },
}

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Runs one connection: a writer task draining the dispatcher's channel and
/// a reader loop applying client frames.
async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<String>(state.event_buffer.max(1));
    let connection = state.dispatcher.registry().attach(tx);
    tracing::debug!(connection = %connection, "websocket connected");

    let sender_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_receiver.next().await {
        match msg {
            Message::Text(text) => {
                let text_str: &str = &text;
                match serde_json::from_str::<ClientFrame>(text_str) {
                    Ok(frame) => apply(&state, &connection, frame),
                    Err(e) => tracing::warn!("invalid WebSocket frame: {e}"),
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.dispatcher.unregister(&connection);
    sender_task.abort();
}

fn apply(state: &GatewayState, connection: &str, frame: ClientFrame) {
    let registry = state.dispatcher.registry();
    match frame {
        ClientFrame::JoinUser { user_id } => state.dispatcher.register(connection, &user_id),
        ClientFrame::JoinRoom { room_id } => {
            registry.join_room(connection, &room_id);
        }
        ClientFrame::LeaveRoom { room_id } => registry.leave_room(connection, &room_id),
        ClientFrame::RequestSync { user_id } | ClientFrame::TriggerSync { user_id } => {
            let Some(user_id) = user_id.or_else(|| registry.user_of(connection)) else {
                tracing::warn!(connection, "sync requested before join_user");
                return;
            };
            let sync = state.dispatcher.sync().clone();
            tokio::spawn(async move {
                // Failures are already reported to the user as `sync_error`.
                if let Err(e) = sync.sync_once(&user_id).await {
                    tracing::warn!(user_id = %user_id, error = %e, "on-demand sync failed");
                }
            });
        }
    }
}

/// Server -> client event names.
pub mod message_types {
    pub const PLATFORM_STATUS: &str = "platform_status";
    pub const ROOMS_UPDATED: &str = "rooms_updated";
    pub const NEW_MESSAGE: &str = "new_message";
    pub const REACTION_ADDED: &str = "reaction_added";
    pub const SYNC_ERROR: &str = "sync_error";
    pub const MESSAGE_SENT: &str = "message_sent";
    pub const SYNC_COMPLETE: &str = "sync_complete";
}
