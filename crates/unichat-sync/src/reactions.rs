// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reaction aggregation.

use std::collections::HashMap;

use serde::Serialize;
use unichat_matrix::types::RoomEvent;

/// One emoji on one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactionGroup {
    pub emoji: String,
    pub count: usize,
    pub senders: Vec<String>,
}

/// Groups annotations by target event, then by key.
///
/// `events` are in chronological order; groups keep the order in which each
/// key first appeared, and a sender is counted once per key.
pub fn aggregate_reactions<'a>(
    events: impl IntoIterator<Item = &'a RoomEvent>,
) -> HashMap<String, Vec<ReactionGroup>> {
    let mut by_target: HashMap<String, Vec<ReactionGroup>> = HashMap::new();

    for event in events {
        if event.kind != "m.reaction" {
            continue;
        }
        let Some(("m.annotation", target, key)) = event.annotation() else {
            continue;
        };
        let sender = event.sender.clone().unwrap_or_default();

        let groups = by_target.entry(target.to_string()).or_default();
        let index = match groups.iter().position(|g| g.emoji == key) {
            Some(index) => index,
            None => {
                groups.push(ReactionGroup {
                    emoji: key.to_string(),
                    count: 0,
                    senders: Vec::new(),
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[index];
        if !group.senders.contains(&sender) {
            group.senders.push(sender);
            group.count = group.senders.len();
        }
    }

    by_target
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn reaction(sender: &str, target: &str, key: &str) -> RoomEvent {
        serde_json::from_value(json!({
            "type": "m.reaction",
            "event_id": format!("${sender}{key}"),
            "sender": sender,
            "content": {"m.relates_to": {"rel_type": "m.annotation", "event_id": target, "key": key}}
        }))
        .unwrap()
    }

    #[test]
    fn groups_by_target_and_key_in_first_seen_order() {
        let events = vec![
            reaction("@a:hs", "$m1", "😂"),
            reaction("@b:hs", "$m1", "👍"),
            reaction("@c:hs", "$m1", "😂"),
            reaction("@a:hs", "$m2", "👍"),
        ];
        let groups = aggregate_reactions(&events);

        let m1 = &groups["$m1"];
        assert_eq!(m1.len(), 2);
        assert_eq!(m1[0].emoji, "😂");
        assert_eq!(m1[0].count, 2);
        assert_eq!(m1[0].senders, ["@a:hs", "@c:hs"]);
        assert_eq!(m1[1].emoji, "👍");
        assert_eq!(groups["$m2"][0].count, 1);
    }

    #[test]
    fn serialized_groups_carry_emoji_count_and_senders() {
        let events = vec![
            reaction("@s1:hs", "$M1", "👍"),
            reaction("@s2:hs", "$M1", "👍"),
            reaction("@s3:hs", "$M2", "🎉"),
        ];
        let value = serde_json::to_value(aggregate_reactions(&events)).unwrap();

        assert_eq!(
            value,
            json!({
                "$M1": [{"emoji": "👍", "count": 2, "senders": ["@s1:hs", "@s2:hs"]}],
                "$M2": [{"emoji": "🎉", "count": 1, "senders": ["@s3:hs"]}],
            })
        );
    }

    #[test]
    fn repeated_sender_counts_once() {
        let events = vec![reaction("@a:hs", "$m1", "👍"), reaction("@a:hs", "$m1", "👍")];
        assert_eq!(aggregate_reactions(&events)["$m1"][0].count, 1);
    }

    #[test]
    fn non_annotations_are_ignored() {
        let message: RoomEvent = serde_json::from_value(json!({
            "type": "m.room.message", "event_id": "$x", "content": {"body": "hi"}
        }))
        .unwrap();
        assert!(aggregate_reactions(&[message]).is_empty());
    }
}
