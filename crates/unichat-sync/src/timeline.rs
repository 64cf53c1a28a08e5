// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Timeline events to realtime events.

use std::time::Duration;

use serde_json::Value;
use unichat_core::types::{NewMessage, ReactionAdded};
use unichat_core::{Platform, RealtimeEvent};
use unichat_matrix::MediaResolver;
use unichat_matrix::media::parse_locator;
use unichat_matrix::types::{RoomEvent, Timeline};

/// Room-level facts attached to every event emitted for a room.
#[derive(Debug, Clone, Copy)]
pub struct RoomContext<'a> {
    pub room_id: &'a str,
    pub room_name: &'a str,
    pub platform: Platform,
}

/// Converts a room timeline into `new_message` and `reaction_added` events,
/// in timeline order.
///
/// When the server reports a gap (`limited`), events older than
/// `stale_window` before `now_ms` are dropped so a reconnect does not replay
/// old history as new.
pub fn timeline_events(
    room: RoomContext<'_>,
    timeline: &Timeline,
    resolver: &MediaResolver,
    now_ms: i64,
    stale_window: Duration,
) -> Vec<RealtimeEvent> {
    let window_ms = i64::try_from(stale_window.as_millis()).unwrap_or(i64::MAX);
    let cutoff = now_ms.saturating_sub(window_ms);

    timeline
        .events
        .iter()
        .filter(|event| !timeline.limited || event.origin_server_ts.unwrap_or(0) >= cutoff)
        .filter_map(|event| to_realtime(room, event, resolver))
        .collect()
}

fn to_realtime(
    room: RoomContext<'_>,
    event: &RoomEvent,
    resolver: &MediaResolver,
) -> Option<RealtimeEvent> {
    let event_id = event.event_id.clone()?;
    let sender = event.sender.clone().unwrap_or_default();
    let timestamp = event.origin_server_ts.unwrap_or(0);

    match event.kind.as_str() {
        "m.room.message" => Some(RealtimeEvent::NewMessage(NewMessage {
            event_id,
            room_id: room.room_id.to_string(),
            room_name: room.room_name.to_string(),
            sender,
            msgtype: event.msgtype().unwrap_or("m.text").to_string(),
            body: event.body().unwrap_or_default().to_string(),
            content: resolve_media(&event.content, resolver),
            timestamp,
            platform: room.platform,
        })),
        "m.reaction" => {
            let (rel_type, related, key) = event.annotation()?;
            (rel_type == "m.annotation").then(|| {
                RealtimeEvent::ReactionAdded(ReactionAdded {
                    event_id,
                    room_id: room.room_id.to_string(),
                    sender,
                    related_event_id: related.to_string(),
                    reaction_key: key.to_string(),
                    timestamp,
                    platform: room.platform,
                })
            })
        }
        _ => None,
    }
}

/// Copy of `content` with `file_url` and `thumbnail_url` added for media.
pub fn resolve_media(content: &Value, resolver: &MediaResolver) -> Value {
    let mut resolved = content.clone();
    let Some(url) = content
        .get("url")
        .and_then(Value::as_str)
        .filter(|url| parse_locator(url).is_some())
    else {
        return resolved;
    };

    let thumbnail = content
        .pointer("/info/thumbnail_url")
        .and_then(Value::as_str)
        .filter(|thumb| parse_locator(thumb).is_some())
        .map(|thumb| resolver.download_url(thumb))
        .or_else(|| {
            matches!(
                content.get("msgtype").and_then(Value::as_str),
                Some("m.image" | "m.video")
            )
            .then(|| resolver.default_thumbnail_url(url))
        });

    if let Some(object) = resolved.as_object_mut() {
        object.insert("file_url".into(), Value::String(resolver.download_url(url)));
        if let Some(thumbnail) = thumbnail {
            object.insert("thumbnail_url".into(), Value::String(thumbnail));
        }
    }
    resolved
}
