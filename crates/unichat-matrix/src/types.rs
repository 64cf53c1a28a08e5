// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the client-server API.
//!
//! Only the fields the gateway reads are modelled; everything else in an
//! event lives in the untyped `content` value.

use std::fmt;
use std::marker::PhantomData;

use serde::de::{DeserializeOwned, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A JSON object decoded into key/value pairs in document order.
///
/// Room maps in sync responses and member maps are kept in server order so
/// downstream emission order matches what the server returned.
#[derive(Debug, Clone, PartialEq)]
pub struct Ordered<T>(pub Vec<(String, T)>);

impl<T> Default for Ordered<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> Ordered<T> {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Ordered<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor<T>(PhantomData<T>);

        impl<'de, T: DeserializeOwned> Visitor<'de> for OrderedVisitor<T> {
            type Value = Ordered<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, T>()? {
                    entries.push((key, value));
                }
                Ok(Ordered(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor(PhantomData))
    }
}

/// A room event (timeline, state, or stripped invite state).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RoomEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub origin_server_ts: Option<i64>,
    #[serde(default)]
    pub state_key: Option<String>,
    #[serde(default)]
    pub content: Value,
}

impl RoomEvent {
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.content.get(key).and_then(Value::as_str)
    }

    pub fn body(&self) -> Option<&str> {
        self.str_field("body")
    }

    pub fn msgtype(&self) -> Option<&str> {
        self.str_field("msgtype")
    }

    /// `(rel_type, event_id, key)` of an `m.relates_to` annotation.
    pub fn annotation(&self) -> Option<(&str, &str, &str)> {
        let relates = self.content.get("m.relates_to")?;
        Some((
            relates.get("rel_type")?.as_str()?,
            relates.get("event_id")?.as_str()?,
            relates.get("key")?.as_str()?,
        ))
    }

    /// Event id this message replies to, if any.
    pub fn reply_to(&self) -> Option<&str> {
        self.content
            .get("m.relates_to")?
            .get("m.in_reply_to")?
            .get("event_id")?
            .as_str()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EventList {
    #[serde(default)]
    pub events: Vec<RoomEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Timeline {
    #[serde(default)]
    pub events: Vec<RoomEvent>,
    /// The server skipped events between the previous batch and this one.
    #[serde(default)]
    pub limited: bool,
    #[serde(default)]
    pub prev_batch: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UnreadNotifications {
    #[serde(default)]
    pub notification_count: Option<u64>,
    #[serde(default)]
    pub highlight_count: Option<u64>,
}

/// Member counts from the room summary block.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RoomCounts {
    #[serde(default, rename = "m.joined_member_count")]
    pub joined_member_count: Option<u64>,
    #[serde(default, rename = "m.invited_member_count")]
    pub invited_member_count: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JoinedRoom {
    #[serde(default)]
    pub summary: RoomCounts,
    #[serde(default)]
    pub state: EventList,
    #[serde(default)]
    pub timeline: Timeline,
    #[serde(default)]
    pub unread_notifications: UnreadNotifications,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InvitedRoom {
    #[serde(default)]
    pub invite_state: EventList,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SyncRooms {
    #[serde(default)]
    pub join: Ordered<JoinedRoom>,
    #[serde(default)]
    pub invite: Ordered<InvitedRoom>,
}

/// Response of `GET /sync`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SyncResponse {
    pub next_batch: String,
    #[serde(default)]
    pub rooms: SyncRooms,
}

/// Response of `GET /rooms/{id}/messages`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MessagesPage {
    #[serde(default)]
    pub chunk: Vec<RoomEvent>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub(crate) struct MembersResponse {
    #[serde(default)]
    pub chunk: Vec<RoomEvent>,
}

/// Profile of a joined member.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JoinedMember {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub(crate) struct JoinedMembersResponse {
    #[serde(default)]
    pub joined: Ordered<JoinedMember>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub(crate) struct JoinedRoomsResponse {
    #[serde(default)]
    pub joined_rooms: Vec<String>,
}

/// Content of `m.room.power_levels`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PowerLevels {
    #[serde(default)]
    pub users: Ordered<i64>,
    #[serde(default)]
    pub users_default: i64,
}

impl PowerLevels {
    /// Users holding the highest explicit level in the room.
    pub fn top_users(&self) -> Vec<&str> {
        let Some(max) = self.users.iter().map(|(_, level)| *level).max() else {
            return Vec::new();
        };
        self.users
            .iter()
            .filter(|(_, level)| **level == max)
            .map(|(user, _)| user)
            .collect()
    }
}

/// Body of `POST /createRoom`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreateRoomRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_direct: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub invite: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RoomIdResponse {
    pub room_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EventIdResponse {
    pub event_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct UploadResponse {
    pub content_uri: String,
}

/// Response of `/login` and `/register`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoginResponse {
    pub user_id: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
}

/// A user directory hit.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DirectoryUser {
    pub user_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct DirectoryResponse {
    #[serde(default)]
    pub results: Vec<DirectoryUser>,
}

/// Standard error body.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub errcode: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_rooms_keep_server_order() {
        let json = serde_json::json!({
            "next_batch": "s2",
            "rooms": {
                "join": {
                    "!zeta:hs": {"timeline": {"events": [], "limited": false}},
                    "!alpha:hs": {},
                    "!mid:hs": {
                        "unread_notifications": {"notification_count": 3},
                        "summary": {"m.joined_member_count": 4}
                    }
                },
                "invite": {"!inv:hs": {"invite_state": {"events": []}}}
            }
        });
        let sync: SyncResponse = serde_json::from_value(json).unwrap();
        let keys: Vec<&str> = sync.rooms.join.keys().collect();
        assert_eq!(keys, ["!zeta:hs", "!alpha:hs", "!mid:hs"]);
        assert_eq!(
            sync.rooms
                .join
                .get("!mid:hs")
                .unwrap()
                .unread_notifications
                .notification_count,
            Some(3)
        );
        assert_eq!(
            sync.rooms.join.get("!mid:hs").unwrap().summary.joined_member_count,
            Some(4)
        );
        assert_eq!(sync.rooms.invite.len(), 1);
    }

    #[test]
    fn sync_without_rooms_is_empty() {
        let sync: SyncResponse = serde_json::from_str(r#"{"next_batch":"s1"}"#).unwrap();
        assert!(sync.rooms.join.is_empty());
        assert!(sync.rooms.invite.is_empty());
    }

    #[test]
    fn power_levels_top_users() {
        let levels: PowerLevels = serde_json::from_value(serde_json::json!({
            "users": {"@a:hs": 50, "@bot:hs": 100, "@self:hs": 100}
        }))
        .unwrap();
        assert_eq!(levels.top_users(), ["@bot:hs", "@self:hs"]);
        assert!(PowerLevels::default().top_users().is_empty());
    }

    #[test]
    fn annotation_and_reply_accessors() {
        let reaction: RoomEvent = serde_json::from_value(serde_json::json!({
            "type": "m.reaction",
            "content": {"m.relates_to": {"rel_type": "m.annotation", "event_id": "$m1", "key": "👍"}}
        }))
        .unwrap();
        assert_eq!(reaction.annotation(), Some(("m.annotation", "$m1", "👍")));

        let reply: RoomEvent = serde_json::from_value(serde_json::json!({
            "type": "m.room.message",
            "content": {"body": "hi", "m.relates_to": {"m.in_reply_to": {"event_id": "$orig"}}}
        }))
        .unwrap();
        assert_eq!(reply.reply_to(), Some("$orig"));
        assert_eq!(reply.body(), Some("hi"));
        assert!(reply.annotation().is_none());
    }

    #[test]
    fn create_room_request_omits_empty_fields() {
        let json = serde_json::to_value(CreateRoomRequest {
            name: Some("WhatsApp Bridge".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"name": "WhatsApp Bridge"}));
    }
}
