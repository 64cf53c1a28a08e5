// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Room summaries built from sync batches.

use serde_json::Value;
use tracing::debug;
use unichat_bridge::Classifier;
use unichat_bridge::classifier::{classify, platform_from_identity};
use unichat_core::{Platform, RoomKind, RoomSummary};
use unichat_matrix::types::{InvitedRoom, JoinedRoom, RoomEvent, SyncRooms};
use unichat_matrix::{MatrixClient, MediaResolver};

/// Joined members at or below which a room is shown as a direct chat.
/// Bridged rooms also hold the bridge bot.
const DIRECT_MEMBERS_NATIVE: u64 = 2;
const DIRECT_MEMBERS_BRIDGED: u64 = 3;

/// Turns sync room sections into [`RoomSummary`] values.
#[derive(Debug, Clone)]
pub struct Summarizer {
    client: MatrixClient,
    classifier: Classifier,
    resolver: MediaResolver,
}

impl Summarizer {
    pub fn new(client: MatrixClient, classifier: Classifier) -> Self {
        let resolver = client.media_resolver();
        Self {
            client,
            classifier,
            resolver,
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Summaries of every joined and invited room in `rooms`, most recent
    /// activity first.
    pub async fn summarize(&self, rooms: &SyncRooms) -> Vec<RoomSummary> {
        let mut summaries = Vec::with_capacity(rooms.join.len() + rooms.invite.len());
        for (room_id, room) in rooms.join.iter() {
            summaries.push(self.joined(room_id, room).await);
        }
        for (room_id, room) in rooms.invite.iter() {
            summaries.push(self.invited(room_id, room));
        }
        sort_by_activity(&mut summaries);
        summaries
    }

    /// Summary of a joined room. The name is read from the batch and fetched
    /// when the batch does not carry it.
    pub async fn joined(&self, room_id: &str, room: &JoinedRoom) -> RoomSummary {
        let state = state_events(room);
        let name = match latest_state_str(&state, "m.room.name", "name") {
            Some(name) => name.to_string(),
            None => self.fetch_name(room_id).await.unwrap_or_default(),
        };

        let platform = self.classifier.classify_room(room_id, &name, &state).await;
        let display_name = self.classifier.display_name(room_id, &name, platform).await;

        let last_message = room
            .timeline
            .events
            .iter()
            .rev()
            .find(|event| event.kind == "m.room.message");
        let threshold = if platform.is_bridged() {
            DIRECT_MEMBERS_BRIDGED
        } else {
            DIRECT_MEMBERS_NATIVE
        };
        let kind = match room.summary.joined_member_count {
            Some(count) if count > threshold => RoomKind::Group,
            _ => RoomKind::Direct,
        };

        let mut summary = RoomSummary {
            room_id: room_id.to_string(),
            name: display_name,
            avatar: self
                .resolver
                .resolve_opt(latest_state_str(&state, "m.room.avatar", "url")),
            kind,
            platform: String::new(),
            platform_code: String::new(),
            last_message: last_message.and_then(RoomEvent::body).map(str::to_string),
            last_message_ts: last_message.and_then(|event| event.origin_server_ts),
            unread_count: room.unread_notifications.notification_count.unwrap_or(0),
            invited: false,
        };
        summary.set_platform(platform);
        summary
    }

    /// Summary of a pending invite, classified from the stripped invite state
    /// and the inviter's identity.
    pub fn invited(&self, room_id: &str, room: &InvitedRoom) -> RoomSummary {
        let state = &room.invite_state.events;
        let name = latest_state_str(state, "m.room.name", "name").unwrap_or_default();
        let own_user = self.client.user_id();
        let inviter = state
            .iter()
            .find(|e| e.kind == "m.room.member" && e.state_key.as_deref() == Some(own_user))
            .and_then(|e| e.sender.as_deref());

        let profiles = self.classifier.profiles();
        let platform = inviter
            .and_then(|user| platform_from_identity(user, profiles))
            .unwrap_or_else(|| classify(None, state, name, profiles));
        let is_direct = state
            .iter()
            .filter(|e| e.kind == "m.room.member")
            .any(|e| e.content.get("is_direct").and_then(Value::as_bool) == Some(true));

        let mut summary = RoomSummary {
            room_id: room_id.to_string(),
            name: if name.trim().is_empty() {
                inviter.unwrap_or("Unknown Room").to_string()
            } else {
                name.to_string()
            },
            avatar: self
                .resolver
                .resolve_opt(latest_state_str(state, "m.room.avatar", "url")),
            kind: if is_direct {
                RoomKind::Direct
            } else {
                RoomKind::Group
            },
            platform: String::new(),
            platform_code: String::new(),
            last_message: None,
            last_message_ts: None,
            unread_count: 0,
            invited: true,
        };
        summary.set_platform(platform);
        summary
    }

    /// Platform of a room outside a sync batch, classified from its current
    /// state. Unreadable state degrades to identity-only classification.
    pub async fn platform_of(&self, room_id: &str) -> Platform {
        let state = match self.client.room_state(room_id).await {
            Ok(state) => state,
            Err(e) => {
                debug!(room_id, error = %e, "room state unavailable");
                Vec::new()
            }
        };
        let name = latest_state_str(&state, "m.room.name", "name").unwrap_or_default();
        self.classifier.classify_room(room_id, name, &state).await
    }

    async fn fetch_name(&self, room_id: &str) -> Option<String> {
        match self.client.state_event(room_id, "m.room.name", "").await {
            Ok(content) => content.get("name").and_then(Value::as_str).map(str::to_string),
            Err(e) => {
                debug!(room_id, error = %e, "room has no readable name");
                None
            }
        }
    }
}

/// State from both the state section and state events in the timeline.
fn state_events(room: &JoinedRoom) -> Vec<RoomEvent> {
    room.state
        .events
        .iter()
        .chain(room.timeline.events.iter().filter(|e| e.state_key.is_some()))
        .cloned()
        .collect()
}

fn latest_state_str<'a>(state: &'a [RoomEvent], kind: &str, field: &str) -> Option<&'a str> {
    state
        .iter()
        .rev()
        .find(|e| e.kind == kind && e.state_key.as_deref().unwrap_or_default().is_empty())
        .and_then(|e| e.str_field(field))
}

/// Most recent activity first; rooms without activity last.
pub fn sort_by_activity(rooms: &mut [RoomSummary]) {
    rooms.sort_by(|a, b| b.last_message_ts.cmp(&a.last_message_ts));
}

/// Platform of a summary, parsed back from its label.
pub fn summary_platform(summary: &RoomSummary) -> Platform {
    summary.platform.parse().unwrap_or(Platform::Matrix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(room_id: &str, ts: Option<i64>) -> RoomSummary {
        let mut summary = RoomSummary {
            room_id: room_id.into(),
            name: room_id.into(),
            avatar: None,
            kind: RoomKind::Direct,
            platform: String::new(),
            platform_code: String::new(),
            last_message: None,
            last_message_ts: ts,
            unread_count: 0,
            invited: false,
        };
        summary.set_platform(Platform::Telegram);
        summary
    }

    #[test]
    fn newest_activity_first_and_idle_rooms_last() {
        let mut rooms = vec![
            summary("!idle", None),
            summary("!old", Some(10)),
            summary("!new", Some(30)),
            summary("!mid", Some(20)),
        ];
        sort_by_activity(&mut rooms);
        let order: Vec<&str> = rooms.iter().map(|r| r.room_id.as_str()).collect();
        assert_eq!(order, ["!new", "!mid", "!old", "!idle"]);
    }

    #[test]
    fn platform_round_trips_through_label() {
        assert_eq!(summary_platform(&summary("!r", None)), Platform::Telegram);
    }
}
