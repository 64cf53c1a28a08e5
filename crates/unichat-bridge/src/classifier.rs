// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Infers which bridged platform a room belongs to.
//!
//! Signals are tried in a fixed order and the first decisive one wins:
//! the identity of the room's highest-privileged members, bridge state
//! events, then the room name. Anything else is a native room.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::Value;
use tracing::debug;
use unichat_core::Platform;
use unichat_matrix::MatrixClient;
use unichat_matrix::types::{JoinedMember, Ordered, PowerLevels, RoomEvent};

use crate::profile::BridgeProfiles;

/// Substrings of bot or puppet user ids, checked after exact bot ids.
const IDENTITY_HINTS: &[(&str, Platform)] = &[
    ("telegrambot", Platform::Telegram),
    ("telegram", Platform::Telegram),
    ("whatsappbot", Platform::Whatsapp),
    ("whatsapp", Platform::Whatsapp),
    ("metabot", Platform::Instagram),
    ("instagram", Platform::Instagram),
    ("twitterbot", Platform::Twitter),
    ("twitter", Platform::Twitter),
];

/// Substrings of bridge state values naming a network.
const NETWORK_HINTS: &[(&str, Platform)] = &[
    ("whatsapp", Platform::Whatsapp),
    ("telegram", Platform::Telegram),
    ("instagram", Platform::Instagram),
    ("meta", Platform::Instagram),
    ("twitter", Platform::Twitter),
];

/// JSON pointers into bridge state content that may name the network.
const BRIDGE_STATE_FIELDS: &[&str] = &[
    "/protocol/id",
    "/protocol/displayname",
    "/channel/platform",
    "/bridgebot",
    "/bridge",
];

static NAME_PATTERNS: LazyLock<Vec<(Regex, Platform)>> = LazyLock::new(|| {
    [
        (r"(?i)\bWA\b|whatsapp", Platform::Whatsapp),
        (r"(?i)\bTG\b|telegram", Platform::Telegram),
        (r"(?i)\bIG\b|instagram", Platform::Instagram),
        (r"(?i)\bTW\b|twitter", Platform::Twitter),
    ]
    .into_iter()
    .map(|(pattern, platform)| {
        (
            Regex::new(pattern).expect("name patterns are static and valid"),
            platform,
        )
    })
    .collect()
});

/// Names that say nothing about the conversation.
const PLACEHOLDER_NAMES: &[&str] = &["", "Unknown Room", "Empty Room"];

/// Names listed before collapsing the rest into "and N more".
const NAMED_MEMBERS: usize = 3;

/// Platform of a single user id: exact bot ids first, then id substrings.
pub fn platform_from_identity(user_id: &str, profiles: &BridgeProfiles) -> Option<Platform> {
    if let Some(platform) = profiles.platform_of_bot(user_id) {
        return Some(platform);
    }
    let lower = user_id.to_lowercase();
    IDENTITY_HINTS
        .iter()
        .find(|(hint, _)| lower.contains(hint))
        .map(|(_, platform)| *platform)
}

/// Platform named by a bridge state event, if any.
pub fn platform_from_bridge_state(state: &[RoomEvent]) -> Option<Platform> {
    state
        .iter()
        .filter(|event| event.kind.contains("bridge") || event.content.get("bridge").is_some())
        .find_map(|event| {
            BRIDGE_STATE_FIELDS
                .iter()
                .filter_map(|pointer| event.content.pointer(pointer).and_then(Value::as_str))
                .find_map(platform_from_hint)
        })
}

fn platform_from_hint(value: &str) -> Option<Platform> {
    let lower = value.to_lowercase();
    NETWORK_HINTS
        .iter()
        .find(|(hint, _)| lower.contains(hint))
        .map(|(_, platform)| *platform)
}

pub fn platform_from_name(name: &str) -> Option<Platform> {
    NAME_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.is_match(name))
        .map(|(_, platform)| *platform)
}

/// Combines all signals. Deterministic for the same inputs.
pub fn classify(
    power_levels: Option<&PowerLevels>,
    state: &[RoomEvent],
    name: &str,
    profiles: &BridgeProfiles,
) -> Platform {
    power_levels
        .and_then(|levels| {
            levels
                .top_users()
                .into_iter()
                .find_map(|user| platform_from_identity(user, profiles))
        })
        .or_else(|| platform_from_bridge_state(state))
        .or_else(|| platform_from_name(name))
        .unwrap_or(Platform::Matrix)
}

pub fn is_placeholder_name(name: &str) -> bool {
    let name = name.trim();
    PLACEHOLDER_NAMES.contains(&name) || name.starts_with('@') || name.starts_with('!')
}

/// Builds a readable name from the other members of a bridged room.
pub fn synthesize_name(
    members: &Ordered<JoinedMember>,
    own_user_id: &str,
    profiles: &BridgeProfiles,
    platform: Platform,
) -> String {
    let names: Vec<String> = members
        .iter()
        .filter(|(user_id, _)| *user_id != own_user_id && !is_bot_like(user_id, profiles))
        .map(|(user_id, member)| member_label(user_id, member))
        .filter(|label| !label.is_empty())
        .collect();

    match names.len() {
        0 => format!("{} Chat", platform.label()),
        n if n <= NAMED_MEMBERS => names.join(", "),
        n => format!(
            "{} and {} more",
            names[..NAMED_MEMBERS].join(", "),
            n - NAMED_MEMBERS
        ),
    }
}

fn is_bot_like(user_id: &str, profiles: &BridgeProfiles) -> bool {
    profiles.is_bot(user_id) || localpart(user_id).to_lowercase().ends_with("bot")
}

fn member_label(user_id: &str, member: &JoinedMember) -> String {
    match member.display_name.as_deref() {
        Some(display) if !display.trim().is_empty() => display
            .split('(')
            .next()
            .unwrap_or(display)
            .trim()
            .to_string(),
        _ => localpart(user_id).to_string(),
    }
}

fn localpart(user_id: &str) -> &str {
    let trimmed = user_id.strip_prefix('@').unwrap_or(user_id);
    trimmed.split(':').next().unwrap_or(trimmed)
}

fn power_levels_in(state: &[RoomEvent]) -> Option<PowerLevels> {
    state
        .iter()
        .find(|event| event.kind == "m.room.power_levels")
        .and_then(|event| serde_json::from_value(event.content.clone()).ok())
}

/// Room classifier backed by the protocol client for power-level lookups.
#[derive(Debug, Clone)]
pub struct Classifier {
    client: MatrixClient,
    profiles: Arc<BridgeProfiles>,
}

impl Classifier {
    pub fn new(client: MatrixClient, profiles: Arc<BridgeProfiles>) -> Self {
        Self { client, profiles }
    }

    pub fn profiles(&self) -> &BridgeProfiles {
        &self.profiles
    }

    /// Classifies a room. Power levels come from `state` when present and are
    /// fetched otherwise; a failed fetch only removes that signal.
    pub async fn classify_room(&self, room_id: &str, name: &str, state: &[RoomEvent]) -> Platform {
        let levels = match power_levels_in(state) {
            Some(levels) => Some(levels),
            None => match self.client.power_levels(room_id).await {
                Ok(levels) => Some(levels),
                Err(e) => {
                    debug!(room_id, error = %e, "power levels unavailable for classification");
                    None
                }
            },
        };
        classify(levels.as_ref(), state, name, &self.profiles)
    }

    /// Returns `name`, or a member-derived name for bridged rooms whose name
    /// is a placeholder.
    pub async fn display_name(&self, room_id: &str, name: &str, platform: Platform) -> String {
        if !platform.is_bridged() || !is_placeholder_name(name) {
            return if name.trim().is_empty() {
                "Unknown Room".to_string()
            } else {
                name.to_string()
            };
        }
        match self.client.joined_members(room_id).await {
            Ok(members) => {
                synthesize_name(&members, self.client.user_id(), &self.profiles, platform)
            }
            Err(e) => {
                debug!(room_id, error = %e, "members unavailable for room name");
                format!("{} Chat", platform.label())
            }
        }
    }
}
