// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sync batches delivered through the connection registry.

mod common;

use chrono::Utc;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use unichat_sync::CycleOutcome;
use unichat_test_utils::text_event;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use common::gateway;

const USER: &str = "@alice:hs.test";
const MESSAGES: usize = 40;

fn large_batch() -> Value {
    let now = Utc::now().timestamp_millis();
    let events: Vec<Value> = (0..MESSAGES)
        .map(|i| text_event(&format!("$m{i}"), "@bob:hs.test", &format!("message {i}"), now - 1_000))
        .collect();
    json!({
        "next_batch": "s2",
        "rooms": {"join": {"!busy:hs.test": {
            "state": {"events": [
                {"type": "m.room.name", "state_key": "", "content": {"name": "Busy"}}
            ]},
            "timeline": {"events": events}
        }}}
    })
}

#[tokio::test]
async fn batches_larger_than_the_socket_buffer_arrive_whole() {
    let gw = gateway(None).await;
    Mock::given(method("GET"))
        .and(path("/_matrix/client/v3/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(large_batch()))
        .mount(&gw.homeserver.server)
        .await;

    let (tx, mut rx) = mpsc::channel(4);
    let connection = gw.registry.attach(tx);
    gw.registry.bind_user(&connection, USER);

    let reader = tokio::spawn(async move {
        let mut frames = Vec::new();
        while frames.len() < MESSAGES + 1 {
            match rx.recv().await {
                Some(frame) => frames.push(serde_json::from_str::<Value>(&frame).unwrap()),
                None => break,
            }
        }
        frames
    });

    let outcome = gw
        .sync
        .run_cycle(USER, Some("s1"), &CancellationToken::new())
        .await;
    assert_eq!(outcome, CycleOutcome::Advanced("s2".into()));

    let frames = reader.await.unwrap();
    assert_eq!(frames.len(), MESSAGES + 1);
    assert_eq!(frames[0]["event"], "rooms_updated");
    let ids: Vec<&str> = frames[1..]
        .iter()
        .map(|f| f["data"]["event_id"].as_str().unwrap())
        .collect();
    let expected: Vec<String> = (0..MESSAGES).map(|i| format!("$m{i}")).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn cancelled_delivery_leaves_the_cursor() {
    let gw = gateway(None).await;
    Mock::given(method("GET"))
        .and(path("/_matrix/client/v3/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(large_batch()))
        .mount(&gw.homeserver.server)
        .await;

    // Nobody drains this buffer, so the cycle stalls on the third event.
    let (tx, _rx) = mpsc::channel(2);
    let connection = gw.registry.attach(tx);
    gw.registry.bind_user(&connection, USER);

    let cancel = CancellationToken::new();
    let cycle = {
        let sync = gw.sync.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { sync.run_cycle(USER, Some("s1"), &cancel).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(!cycle.is_finished());

    cancel.cancel();
    assert_eq!(cycle.await.unwrap(), CycleOutcome::Cancelled);
}
