// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the protocol client, bridge engine, sync engine, and gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A chat platform reachable through a bridge bot, or the base protocol itself.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Platform {
    Whatsapp,
    Telegram,
    Instagram,
    Twitter,
    Matrix,
}

impl Platform {
    /// Platforms that are reached through a bridge bot.
    pub const BRIDGED: [Platform; 4] = [
        Platform::Whatsapp,
        Platform::Telegram,
        Platform::Instagram,
        Platform::Twitter,
    ];

    /// Human label shown next to rooms.
    pub fn label(self) -> &'static str {
        match self {
            Self::Whatsapp => "Whatsapp",
            Self::Telegram => "Telegram",
            Self::Instagram => "Instagram",
            Self::Twitter => "Twitter",
            Self::Matrix => "Matrix",
        }
    }

    /// Two-letter platform code.
    pub fn code(self) -> &'static str {
        match self {
            Self::Whatsapp => "WA",
            Self::Telegram => "TG",
            Self::Instagram => "IG",
            Self::Twitter => "TW",
            Self::Matrix => "MX",
        }
    }

    pub fn is_bridged(self) -> bool {
        self != Self::Matrix
    }
}

/// Opaque identifier of a pending verification session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Mint a fresh random session id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Health status reported by service health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Service is fully operational.
    Healthy,
    /// Service is operational but experiencing issues.
    Degraded(String),
    /// Service is not operational.
    Unhealthy(String),
}

/// Whether a bridged account is linked, as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlatformStatus {
    pub connected: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Direct,
    Group,
}

/// Derived view of a room, rebuilt from protocol state on every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: String,
    pub name: String,
    pub avatar: Option<String>,
    #[serde(rename = "type")]
    pub kind: RoomKind,
    /// Platform label, e.g. `Whatsapp`.
    pub platform: String,
    /// Platform code, e.g. `WA`.
    pub platform_code: String,
    pub last_message: Option<String>,
    pub last_message_ts: Option<i64>,
    pub unread_count: u64,
    pub invited: bool,
}

impl RoomSummary {
    pub fn set_platform(&mut self, platform: Platform) {
        self.platform = platform.label().to_string();
        self.platform_code = platform.code().to_string();
    }
}

/// A file to be uploaded and posted into a room.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

// --- Realtime event payloads ---

/// Events pushed to realtime subscribers.
///
/// Serialized as `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RealtimeEvent {
    PlatformStatus(PlatformStatusChanged),
    RoomsUpdated(RoomsUpdated),
    NewMessage(NewMessage),
    ReactionAdded(ReactionAdded),
    SyncError(SyncFailure),
    MessageSent(MessageSent),
    SyncComplete(SyncComplete),
}

impl RealtimeEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PlatformStatus(_) => "platform_status",
            Self::RoomsUpdated(_) => "rooms_updated",
            Self::NewMessage(_) => "new_message",
            Self::ReactionAdded(_) => "reaction_added",
            Self::SyncError(_) => "sync_error",
            Self::MessageSent(_) => "message_sent",
            Self::SyncComplete(_) => "sync_complete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformStatusChanged {
    pub platform: Platform,
    pub connected: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomsUpdated {
    pub rooms: Vec<RoomSummary>,
    pub next_batch: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewMessage {
    pub event_id: String,
    pub room_id: String,
    pub room_name: String,
    pub sender: String,
    pub msgtype: String,
    pub body: String,
    /// Event content with media locators resolved (`file_url`, `thumbnail_url`).
    pub content: serde_json::Value,
    pub timestamp: i64,
    pub platform: Platform,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReactionAdded {
    pub event_id: String,
    pub room_id: String,
    pub sender: String,
    pub related_event_id: String,
    pub reaction_key: String,
    pub timestamp: i64,
    pub platform: Platform,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncFailure {
    pub error: String,
    pub details: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageSent {
    pub room_id: String,
    pub event_id: String,
    /// `text` or the file's message type (`m.image`, `m.file`, ...).
    pub kind: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncComplete {
    pub next_batch: String,
    pub rooms: usize,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn platform_labels_and_codes() {
        assert_eq!(Platform::Whatsapp.label(), "Whatsapp");
        assert_eq!(Platform::Whatsapp.code(), "WA");
        assert_eq!(Platform::Telegram.code(), "TG");
        assert_eq!(Platform::Instagram.code(), "IG");
        assert_eq!(Platform::Twitter.code(), "TW");
        assert_eq!(Platform::Matrix.code(), "MX");
        assert!(!Platform::Matrix.is_bridged());
        assert!(Platform::BRIDGED.iter().all(|p| p.is_bridged()));
    }

    #[test]
    fn platform_parses_case_insensitively() {
        assert_eq!(Platform::from_str("WhatsApp").unwrap(), Platform::Whatsapp);
        assert_eq!(Platform::from_str("twitter").unwrap(), Platform::Twitter);
        assert!(Platform::from_str("signal").is_err());
        assert_eq!(Platform::Instagram.to_string(), "instagram");
    }

    #[test]
    fn realtime_event_uses_adjacent_tagging() {
        let event = RealtimeEvent::SyncError(SyncFailure {
            error: "Sync failed".into(),
            details: "boom".into(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "sync_error");
        assert_eq!(json["data"]["error"], "Sync failed");
        assert_eq!(event.name(), "sync_error");
    }

    #[test]
    fn room_summary_serializes_kind_as_type() {
        let mut summary = RoomSummary {
            room_id: "!r:hs".into(),
            name: "Room".into(),
            avatar: None,
            kind: RoomKind::Direct,
            platform: String::new(),
            platform_code: String::new(),
            last_message: None,
            last_message_ts: None,
            unread_count: 0,
            invited: false,
        };
        summary.set_platform(Platform::Telegram);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["type"], "direct");
        assert_eq!(json["platform"], "Telegram");
        assert_eq!(json["platform_code"], "TG");
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionId::generate(), SessionId::generate());
    }
}
