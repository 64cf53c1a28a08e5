// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request/response messaging operations used by the HTTP surface.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use unichat_core::types::{MessageSent, ReactionAdded};
use unichat_core::{
    Attachment, EventSink, MediaUploader, Platform, RealtimeEvent, RoomSummary, UnichatError,
};
use unichat_matrix::types::{CreateRoomRequest, DirectoryUser, RoomEvent};
use unichat_matrix::{MatrixClient, MediaResolver};

use crate::engine::SyncSettings;
use crate::reactions::{ReactionGroup, aggregate_reactions};
use crate::summary::Summarizer;
use crate::timeline::resolve_media;

/// Messages returned by a plain room read.
pub const DEFAULT_MESSAGE_LIMIT: u32 = 100;
/// How far back a history read goes.
pub const HISTORY_WINDOW: Duration = Duration::from_secs(15 * 24 * 60 * 60);
/// Upper bound on pages fetched for one history read.
const MAX_HISTORY_PAGES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplyPreview {
    pub event_id: String,
    pub sender: Option<String>,
    pub body: Option<String>,
}

/// A room message prepared for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageView {
    pub event_id: String,
    pub sender: String,
    pub sender_name: String,
    pub is_own: bool,
    pub msgtype: String,
    pub body: String,
    pub content: Value,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplyPreview>,
    pub reactions: Vec<ReactionGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomMessages {
    pub room_id: String,
    pub platform: Platform,
    /// Oldest first.
    pub messages: Vec<MessageView>,
    /// Pagination token for older messages.
    pub end: Option<String>,
}

/// What to post into a room.
#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    pub text: Option<String>,
    pub reply_to: Option<String>,
    pub files: Vec<Attachment>,
}

/// Outcome of one text or file item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentItem {
    /// `text` or the message type used for the file.
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendReport {
    /// True when at least one item was delivered.
    pub success: bool,
    pub room_id: String,
    pub results: Vec<SentItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReactionReceipt {
    pub event_id: String,
    pub room_id: String,
    pub related_event_id: String,
    pub reaction_key: String,
    pub platform: Platform,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupCreated {
    pub room_id: String,
    pub invited: Vec<String>,
    pub failed: Vec<String>,
}

/// Room listing, history, sending, and room management.
pub struct MessagingService {
    client: MatrixClient,
    summarizer: Summarizer,
    resolver: MediaResolver,
    uploader: Arc<dyn MediaUploader>,
    sink: Arc<dyn EventSink>,
    settings: SyncSettings,
}

impl MessagingService {
    pub fn new(
        client: MatrixClient,
        summarizer: Summarizer,
        uploader: Arc<dyn MediaUploader>,
        sink: Arc<dyn EventSink>,
        settings: SyncSettings,
    ) -> Self {
        let resolver = client.media_resolver();
        Self {
            client,
            summarizer,
            resolver,
            uploader,
            sink,
            settings,
        }
    }

    /// Joined and invited rooms, most recent activity first.
    pub async fn list_rooms(&self) -> Result<Vec<RoomSummary>, UnichatError> {
        let filter = self.settings.list_filter();
        let sync = self.client.sync(None, 0, Some(&filter)).await?;
        Ok(self.summarizer.summarize(&sync.rooms).await)
    }

    /// A page of room messages, oldest first, with reactions and reply
    /// previews attached.
    ///
    /// Without `from` the page ends at the latest message. Pass a previous
    /// page's `end` to continue further back.
    pub async fn get_room_messages(
        &self,
        room_id: &str,
        limit: Option<u32>,
        from: Option<&str>,
    ) -> Result<RoomMessages, UnichatError> {
        let limit = limit.unwrap_or(DEFAULT_MESSAGE_LIMIT).clamp(1, DEFAULT_MESSAGE_LIMIT);
        let page = self.client.messages(room_id, limit, from).await?;
        let mut events = page.chunk;
        events.reverse();
        self.build(room_id, events, page.end).await
    }

    /// Messages from the last fifteen days, oldest first.
    pub async fn get_room_history(&self, room_id: &str) -> Result<RoomMessages, UnichatError> {
        let window_ms = i64::try_from(HISTORY_WINDOW.as_millis()).unwrap_or(i64::MAX);
        let cutoff = Utc::now().timestamp_millis() - window_ms;

        let mut collected: Vec<RoomEvent> = Vec::new();
        let mut from: Option<String> = None;
        let mut end = None;
        for _ in 0..MAX_HISTORY_PAGES {
            let page = self
                .client
                .messages(room_id, DEFAULT_MESSAGE_LIMIT, from.as_deref())
                .await?;
            let exhausted = page.chunk.is_empty()
                || page.end.is_none()
                || page.chunk.iter().any(|e| e.origin_server_ts.unwrap_or(0) < cutoff);
            collected.extend(page.chunk);
            end = page.end.clone();
            if exhausted {
                break;
            }
            from = page.end;
        }

        collected.retain(|e| e.origin_server_ts.unwrap_or(0) >= cutoff);
        collected.reverse();
        debug!(room_id, events = collected.len(), "history collected");
        self.build(room_id, collected, end).await
    }

    async fn build(
        &self,
        room_id: &str,
        events: Vec<RoomEvent>,
        end: Option<String>,
    ) -> Result<RoomMessages, UnichatError> {
        let names = self.display_names(room_id).await;
        let platform = self.summarizer.platform_of(room_id).await;
        let reactions = aggregate_reactions(&events);
        let by_id: HashMap<&str, &RoomEvent> = events
            .iter()
            .filter_map(|e| e.event_id.as_deref().map(|id| (id, e)))
            .collect();
        let own_user = self.client.user_id();

        let mut messages: Vec<MessageView> = events
            .iter()
            .filter(|e| e.kind == "m.room.message")
            .filter_map(|event| {
                let event_id = event.event_id.clone()?;
                let sender = event.sender.clone().unwrap_or_default();
                let reply_to = event.reply_to().map(|target| {
                    let original = by_id.get(target);
                    ReplyPreview {
                        event_id: target.to_string(),
                        sender: original.and_then(|e| e.sender.clone()),
                        body: original.and_then(|e| e.body()).map(str::to_string),
                    }
                });
                Some(MessageView {
                    sender_name: names
                        .get(&sender)
                        .cloned()
                        .unwrap_or_else(|| sender.clone()),
                    is_own: sender == own_user,
                    msgtype: event.msgtype().unwrap_or("m.text").to_string(),
                    body: event.body().unwrap_or_default().to_string(),
                    content: resolve_media(&event.content, &self.resolver),
                    timestamp: event.origin_server_ts.unwrap_or(0),
                    reply_to,
                    reactions: reactions.get(&event_id).cloned().unwrap_or_default(),
                    event_id,
                    sender,
                })
            })
            .collect();
        messages.sort_by_key(|m| m.timestamp);

        Ok(RoomMessages {
            room_id: room_id.to_string(),
            platform,
            messages,
            end,
        })
    }

    async fn display_names(&self, room_id: &str) -> HashMap<String, String> {
        match self.client.members(room_id).await {
            Ok(members) => members
                .into_iter()
                .filter_map(|member| {
                    let user_id = member.state_key.clone()?;
                    let name = member.str_field("displayname")?.to_string();
                    Some((user_id, name))
                })
                .collect(),
            Err(e) => {
                debug!(room_id, error = %e, "member names unavailable");
                HashMap::new()
            }
        }
    }

    /// Posts text and files to a room; text goes first.
    ///
    /// Items are delivered independently. The report fails only when nothing
    /// was delivered.
    pub async fn send_message(
        &self,
        room_id: &str,
        user_id: &str,
        message: OutgoingMessage,
    ) -> Result<SendReport, UnichatError> {
        let text = message.text.filter(|t| !t.trim().is_empty());
        if text.is_none() && message.files.is_empty() {
            return Err(UnichatError::InvalidInput(
                "a message needs text or at least one file".into(),
            ));
        }

        let mut results = Vec::with_capacity(message.files.len() + 1);
        if let Some(text) = text {
            let mut content = json!({ "msgtype": "m.text", "body": text });
            if let Some(reply_to) = &message.reply_to {
                content["m.relates_to"] = json!({ "m.in_reply_to": { "event_id": reply_to } });
            }
            let sent = self.client.send_event(room_id, "m.room.message", &content).await;
            results.push(self.record(room_id, user_id, "text", None, &text, sent));
        }

        for file in &message.files {
            let msgtype = msgtype_for(&file.content_type);
            let sent = match self.uploader.upload(file).await {
                Ok(url) => {
                    let content = json!({
                        "msgtype": msgtype,
                        "body": file.file_name,
                        "url": url,
                        "info": { "mimetype": file.content_type, "size": file.data.len() },
                    });
                    self.client.send_event(room_id, "m.room.message", &content).await
                }
                Err(e) => Err(e),
            };
            results.push(self.record(
                room_id,
                user_id,
                msgtype,
                Some(file.file_name.clone()),
                &file.file_name,
                sent,
            ));
        }

        let success = results.iter().any(|r| r.event_id.is_some());
        info!(room_id, items = results.len(), success, "message send finished");
        Ok(SendReport {
            success,
            room_id: room_id.to_string(),
            results,
        })
    }

    fn record(
        &self,
        room_id: &str,
        user_id: &str,
        kind: &str,
        file_name: Option<String>,
        body: &str,
        sent: Result<String, UnichatError>,
    ) -> SentItem {
        match sent {
            Ok(event_id) => {
                self.sink.emit_to_user(
                    user_id,
                    RealtimeEvent::MessageSent(MessageSent {
                        room_id: room_id.to_string(),
                        event_id: event_id.clone(),
                        kind: kind.to_string(),
                        body: body.to_string(),
                    }),
                );
                SentItem {
                    kind: kind.to_string(),
                    file_name,
                    event_id: Some(event_id),
                    error: None,
                }
            }
            Err(e) => {
                warn!(room_id, kind, error = %e, "message item not delivered");
                SentItem {
                    kind: kind.to_string(),
                    file_name,
                    event_id: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Reacts to `event_id` and tells both the user and the room's subscribers.
    pub async fn send_reaction(
        &self,
        room_id: &str,
        user_id: &str,
        event_id: &str,
        key: &str,
    ) -> Result<ReactionReceipt, UnichatError> {
        if key.trim().is_empty() {
            return Err(UnichatError::InvalidInput("reaction key is empty".into()));
        }
        let reaction_id = self.client.send_reaction(room_id, event_id, key).await?;
        let platform = self.summarizer.platform_of(room_id).await;

        let event = RealtimeEvent::ReactionAdded(ReactionAdded {
            event_id: reaction_id.clone(),
            room_id: room_id.to_string(),
            sender: self.client.user_id().to_string(),
            related_event_id: event_id.to_string(),
            reaction_key: key.to_string(),
            timestamp: Utc::now().timestamp_millis(),
            platform,
        });
        self.sink.emit_to_user(user_id, event.clone());
        self.sink.emit_to_room(room_id, event);

        Ok(ReactionReceipt {
            event_id: reaction_id,
            room_id: room_id.to_string(),
            related_event_id: event_id.to_string(),
            reaction_key: key.to_string(),
            platform,
        })
    }

    /// Creates a private group and invites each user; failed invites are
    /// reported, not fatal.
    pub async fn create_group(
        &self,
        name: &str,
        invitees: &[String],
        topic: Option<&str>,
    ) -> Result<GroupCreated, UnichatError> {
        if name.trim().is_empty() {
            return Err(UnichatError::InvalidInput("group name is empty".into()));
        }
        let room_id = self
            .client
            .create_room(&CreateRoomRequest {
                name: Some(name.to_string()),
                topic: topic.map(str::to_string),
                preset: Some("private_chat".into()),
                is_direct: false,
                invite: Vec::new(),
            })
            .await?;

        let mut invited = Vec::new();
        let mut failed = Vec::new();
        for user in invitees {
            match self.client.invite(&room_id, user).await {
                Ok(()) => invited.push(user.clone()),
                Err(e) => {
                    warn!(room_id = %room_id, user = %user, error = %e, "invite failed");
                    failed.push(user.clone());
                }
            }
        }
        info!(room_id = %room_id, invited = invited.len(), failed = failed.len(), "group created");
        Ok(GroupCreated {
            room_id,
            invited,
            failed,
        })
    }

    pub async fn leave_room(&self, room_id: &str) -> Result<(), UnichatError> {
        self.client.leave(room_id).await
    }

    pub async fn search_users(
        &self,
        term: &str,
        limit: u32,
    ) -> Result<Vec<DirectoryUser>, UnichatError> {
        if term.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.client.search_users(term, limit).await
    }
}

/// Message type for a file's MIME type.
pub fn msgtype_for(content_type: &str) -> &'static str {
    match content_type.split('/').next().unwrap_or_default() {
        "image" => "m.image",
        "video" => "m.video",
        "audio" => "m.audio",
        _ => "m.file",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msgtypes_follow_mime_family() {
        assert_eq!(msgtype_for("image/png"), "m.image");
        assert_eq!(msgtype_for("video/mp4"), "m.video");
        assert_eq!(msgtype_for("audio/ogg"), "m.audio");
        assert_eq!(msgtype_for("application/pdf"), "m.file");
        assert_eq!(msgtype_for(""), "m.file");
    }

    #[test]
    fn history_window_is_fifteen_days() {
        assert_eq!(HISTORY_WINDOW.as_secs(), 1_296_000);
    }
}
