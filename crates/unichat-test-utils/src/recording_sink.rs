// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event sink that records emissions for assertion in tests.

use std::sync::{Arc, Mutex};

use unichat_core::{EventSink, RealtimeEvent};

/// Where an event was addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    User(String),
    Room(String),
}

/// Captures every `(target, event)` pair in emission order.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<(Recorded, RealtimeEvent)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(Recorded, RealtimeEvent)> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Event names in emission order.
    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(|(_, e)| e.name()).collect()
    }

    /// Events addressed to one user.
    pub fn for_user(&self, user_id: &str) -> Vec<RealtimeEvent> {
        self.events()
            .into_iter()
            .filter(|(target, _)| *target == Recorded::User(user_id.to_string()))
            .map(|(_, e)| e)
            .collect()
    }

    /// Events addressed to one room.
    pub fn for_room(&self, room_id: &str) -> Vec<RealtimeEvent> {
        self.events()
            .into_iter()
            .filter(|(target, _)| *target == Recorded::Room(room_id.to_string()))
            .map(|(_, e)| e)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }

    fn push(&self, target: Recorded, event: RealtimeEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push((target, event));
        }
    }
}

impl EventSink for RecordingSink {
    fn emit_to_user(&self, user_id: &str, event: RealtimeEvent) {
        self.push(Recorded::User(user_id.to_string()), event);
    }

    fn emit_to_room(&self, room_id: &str, event: RealtimeEvent) {
        self.push(Recorded::Room(room_id.to_string()), event);
    }
}

#[cfg(test)]
mod tests {
    use unichat_core::RealtimeEvent;
    use unichat_core::types::SyncFailure;

    use super::*;

    fn failure() -> RealtimeEvent {
        RealtimeEvent::SyncError(SyncFailure {
            error: "Sync failed".into(),
            details: "boom".into(),
        })
    }

    #[test]
    fn records_targets_in_order() {
        let sink = RecordingSink::new();
        sink.emit_to_user("@u:x", failure());
        sink.emit_to_room("!r:x", failure());

        assert_eq!(sink.names(), vec!["sync_error", "sync_error"]);
        assert_eq!(sink.for_user("@u:x").len(), 1);
        assert_eq!(sink.for_room("!r:x").len(), 1);
        assert!(sink.for_user("@other:x").is_empty());

        sink.clear();
        assert!(sink.events().is_empty());
    }
}
