// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! wiremock homeserver with helpers for the endpoints bridge and sync tests touch.

use serde_json::{Value, json};
use unichat_matrix::MatrixClient;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// User the test client acts as.
pub const TEST_USER: &str = "@unichat:hs.test";
pub const TEST_TOKEN: &str = "test-token";

const CLIENT: &str = "/_matrix/client/v3";

/// A running mock homeserver.
pub struct MockHomeserver {
    pub server: MockServer,
}

impl MockHomeserver {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Client acting as [`TEST_USER`] against this server.
    pub fn client(&self) -> MatrixClient {
        MatrixClient::new(&self.server.uri(), TEST_USER, TEST_TOKEN)
            .expect("mock server uri is a valid base url")
    }

    /// Makes `room_id` the existing direct room with `bot_id`.
    pub async fn mount_direct_room(&self, room_id: &str, bot_id: &str) {
        Mock::given(method("GET"))
            .and(path(format!("{CLIENT}/joined_rooms")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "joined_rooms": [room_id] })),
            )
            .mount(&self.server)
            .await;
        self.mount_joined_members(
            room_id,
            json!({ TEST_USER: {}, bot_id: { "display_name": "bridge bot" } }),
        )
        .await;
    }

    pub async fn mount_joined_members(&self, room_id: &str, joined: Value) {
        Mock::given(method("GET"))
            .and(path(format!("{CLIENT}/rooms/{room_id}/joined_members")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "joined": joined })))
            .mount(&self.server)
            .await;
    }

    /// Answers sends into `room_id` with `event_ids` in order; the last one repeats.
    pub async fn mount_sends(&self, room_id: &str, event_ids: &[&str]) {
        let pattern = format!(
            r"^{CLIENT}/rooms/{}/send/[^/]+/[^/]+$",
            regex_escape(room_id)
        );
        let Some((last, first)) = event_ids.split_last() else {
            return;
        };
        for event_id in first {
            Mock::given(method("PUT"))
                .and(path_regex(pattern.clone()))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(json!({ "event_id": event_id })),
                )
                .up_to_n_times(1)
                .mount(&self.server)
                .await;
        }
        Mock::given(method("PUT"))
            .and(path_regex(pattern))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "event_id": last })))
            .mount(&self.server)
            .await;
    }

    /// Serves `chunk` (newest first) for every `/messages` read of `room_id`.
    pub async fn mount_messages(&self, room_id: &str, chunk: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path(format!("{CLIENT}/rooms/{room_id}/messages")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "chunk": chunk,
                "start": "t1",
                "end": "t0",
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_power_levels(&self, room_id: &str, users: Value) {
        Mock::given(method("GET"))
            .and(path(format!(
                "{CLIENT}/rooms/{room_id}/state/m.room.power_levels"
            )))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "users": users })))
            .mount(&self.server)
            .await;
    }

    /// Every request that reached the server, for body assertions.
    pub async fn sent_bodies(&self) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.method.as_str() == "PUT")
            .filter_map(|r| serde_json::from_slice(&r.body).ok())
            .collect()
    }
}

/// `m.room.message` text event.
pub fn text_event(event_id: &str, sender: &str, body: &str, ts: i64) -> Value {
    json!({
        "type": "m.room.message",
        "event_id": event_id,
        "sender": sender,
        "origin_server_ts": ts,
        "content": { "msgtype": "m.text", "body": body },
    })
}

/// `m.room.message` image event pointing at `mxc`.
pub fn image_event(event_id: &str, sender: &str, mxc: &str, ts: i64) -> Value {
    json!({
        "type": "m.room.message",
        "event_id": event_id,
        "sender": sender,
        "origin_server_ts": ts,
        "content": { "msgtype": "m.image", "body": "qr.png", "url": mxc },
    })
}

fn regex_escape(value: &str) -> String {
    value
        .chars()
        .flat_map(|c| {
            let escape = matches!(c, '.' | '$' | '^' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\');
            escape.then_some('\\').into_iter().chain(std::iter::once(c))
        })
        .collect()
}
