// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Push side of the realtime dispatcher, as seen by the engines.

use async_trait::async_trait;

use crate::types::RealtimeEvent;

/// Delivery of realtime events to connected users and room subscribers.
///
/// Events for a user without an active connection are dropped, never queued.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    /// Deliver an event to the user's current connection, if any, without
    /// waiting. A connection that cannot take it right now loses it.
    fn emit_to_user(&self, user_id: &str, event: RealtimeEvent);

    /// Deliver an event to every connection subscribed to the room.
    fn emit_to_room(&self, room_id: &str, event: RealtimeEvent);

    /// Deliver an event to the user's current connection, waiting until the
    /// connection has room for it.
    async fn deliver_to_user(&self, user_id: &str, event: RealtimeEvent) {
        self.emit_to_user(user_id, event);
    }
}
