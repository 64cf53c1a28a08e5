// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A bridge bot that answers gateway commands from a script.
//!
//! Sends into the bot room are appended to a shared transcript and matched
//! against the script; the first unused entry whose trigger occurs in the
//! body contributes its replies. `/messages` serves the transcript newest
//! first, the way the homeserver does with `dir=b`.

use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, Request, Respond, ResponseTemplate};

use crate::homeserver::{MockHomeserver, TEST_USER, image_event, text_event};

#[derive(Debug)]
struct BotState {
    bot_id: String,
    script: Vec<Option<(String, Vec<String>)>>,
    transcript: Vec<Value>,
    next_id: usize,
}

impl BotState {
    fn push(&mut self, sender: &str, body: &str) -> String {
        self.next_id += 1;
        let event_id = format!("$ev{}", self.next_id);
        let ts = 1_700_000_000_000 + self.next_id as i64;
        let event = match body.strip_prefix("mxc://") {
            Some(_) => image_event(&event_id, sender, body, ts),
            None => text_event(&event_id, sender, body, ts),
        };
        self.transcript.push(event);
        event_id
    }

    fn react(&mut self, body: &str) {
        let replies = self
            .script
            .iter_mut()
            .find(|entry| entry.as_ref().is_some_and(|(trigger, _)| body.contains(trigger.as_str())))
            .and_then(Option::take)
            .map(|(_, replies)| replies)
            .unwrap_or_default();
        let bot_id = self.bot_id.clone();
        for reply in replies {
            self.push(&bot_id, &reply);
        }
    }
}

/// Handle to a scripted bot mounted on a [`MockHomeserver`].
#[derive(Debug, Clone)]
pub struct ScriptedBot {
    state: Arc<Mutex<BotState>>,
}

impl ScriptedBot {
    /// `script` is a list of `(trigger, replies)`; a reply starting with
    /// `mxc://` is sent as an image.
    pub fn new(bot_id: &str, script: &[(&str, &[&str])]) -> Self {
        let script = script
            .iter()
            .map(|(trigger, replies)| {
                Some((
                    trigger.to_string(),
                    replies.iter().map(|r| r.to_string()).collect(),
                ))
            })
            .collect();
        Self {
            state: Arc::new(Mutex::new(BotState {
                bot_id: bot_id.to_string(),
                script,
                transcript: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// Serves this bot's transcript for `room_id`.
    pub async fn mount(&self, homeserver: &MockHomeserver, room_id: &str) {
        let escaped = room_id.replace('.', r"\.").replace('$', r"\$");
        Mock::given(method("PUT"))
            .and(path_regex(format!(
                r"^/_matrix/client/v3/rooms/{escaped}/send/m\.room\.message/[^/]+$"
            )))
            .respond_with(SendResponder(self.clone()))
            .mount(&homeserver.server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/_matrix/client/v3/rooms/{room_id}/messages")))
            .respond_with(MessagesResponder(self.clone()))
            .mount(&homeserver.server)
            .await;
    }

    /// Makes the bot say something unprompted.
    pub fn say(&self, body: &str) {
        if let Ok(mut state) = self.state.lock() {
            let bot_id = state.bot_id.clone();
            state.push(&bot_id, body);
        }
    }

    /// Bodies the gateway sent, in order.
    pub fn received(&self) -> Vec<String> {
        let Ok(state) = self.state.lock() else {
            return Vec::new();
        };
        state
            .transcript
            .iter()
            .filter(|event| event["sender"] == TEST_USER)
            .filter_map(|event| event["content"]["body"].as_str().map(str::to_string))
            .collect()
    }
}

struct SendResponder(ScriptedBot);

impl Respond for SendResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or_default();
        let text = body["body"].as_str().unwrap_or_default();
        let Ok(mut state) = self.0.state.lock() else {
            return ResponseTemplate::new(500);
        };
        let event_id = state.push(TEST_USER, text);
        state.react(text);
        ResponseTemplate::new(200).set_body_json(json!({ "event_id": event_id }))
    }
}

struct MessagesResponder(ScriptedBot);

impl Respond for MessagesResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let Ok(state) = self.0.state.lock() else {
            return ResponseTemplate::new(500);
        };
        let chunk: Vec<Value> = state.transcript.iter().rev().cloned().collect();
        ResponseTemplate::new(200).set_body_json(json!({
            "chunk": chunk,
            "start": "t1",
            "end": "t0",
        }))
    }
}
