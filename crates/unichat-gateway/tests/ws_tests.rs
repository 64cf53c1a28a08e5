// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Realtime dispatcher tests over a live WebSocket.

mod common;

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use unichat_core::Platform;
use unichat_gateway::router;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, ResponseTemplate};

use common::{TestGateway, gateway};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const USER: &str = "@alice:hs.test";

async fn serve(gw: &TestGateway) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(gw.state.clone());
    tokio::spawn(async move { axum::serve(listener, app).await });
    format!("ws://{addr}/ws")
}

async fn mount_quiet_sync(gw: &TestGateway) {
    Mock::given(method("GET"))
        .and(path("/_matrix/client/v3/sync"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"next_batch": "s1"}))
                .set_delay(Duration::from_millis(50)),
        )
        .mount(&gw.homeserver.server)
        .await;
}

async fn send(socket: &mut Socket, frame: Value) {
    socket.send(Message::text(frame.to_string())).await.unwrap();
}

async fn next_event(socket: &mut Socket) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("event within five seconds")
            .unwrap()
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn joining_pushes_statuses_then_starts_sync() {
    let gw = gateway(None).await;
    mount_quiet_sync(&gw).await;
    gw.statuses.set(Platform::Whatsapp, Some(USER), true);
    let (mut socket, _) = connect_async(serve(&gw).await).await.unwrap();

    send(&mut socket, json!({"type": "join_user", "user_id": USER})).await;

    let mut statuses = Vec::new();
    for _ in 0..4 {
        let event = next_event(&mut socket).await;
        assert_eq!(event["event"], "platform_status");
        statuses.push((
            event["data"]["platform"].as_str().unwrap().to_string(),
            event["data"]["connected"].as_bool().unwrap(),
        ));
    }
    assert_eq!(
        statuses,
        [
            ("whatsapp".to_string(), true),
            ("telegram".to_string(), false),
            ("instagram".to_string(), false),
            ("twitter".to_string(), false),
        ]
    );

    let rooms = next_event(&mut socket).await;
    assert_eq!(rooms["event"], "rooms_updated");
    assert!(gw.sync.is_running(USER));
}

#[tokio::test]
async fn closing_the_socket_stops_sync() {
    let gw = gateway(None).await;
    mount_quiet_sync(&gw).await;
    let (mut socket, _) = connect_async(serve(&gw).await).await.unwrap();

    send(&mut socket, json!({"type": "join_user", "user_id": USER})).await;
    next_event(&mut socket).await;
    wait_until(|| gw.sync.is_running(USER)).await;

    socket.close(None).await.unwrap();
    wait_until(|| !gw.sync.is_running(USER)).await;
    assert!(!gw.registry.is_online(USER));
}

#[tokio::test]
async fn stale_socket_close_keeps_the_new_registration() {
    let gw = gateway(None).await;
    mount_quiet_sync(&gw).await;
    let url = serve(&gw).await;
    let (mut first, _) = connect_async(url.as_str()).await.unwrap();
    let (mut second, _) = connect_async(url.as_str()).await.unwrap();

    send(&mut first, json!({"type": "join_user", "user_id": USER})).await;
    next_event(&mut first).await;
    send(&mut second, json!({"type": "join_user", "user_id": USER})).await;
    next_event(&mut second).await;

    first.close(None).await.unwrap();
    wait_until(|| gw.registry.connection_count() == 1).await;

    assert!(gw.registry.is_online(USER));
    assert!(gw.sync.is_running(USER));
}

#[tokio::test]
async fn reactions_fan_out_to_room_subscribers() {
    let gw = gateway(None).await;
    mount_quiet_sync(&gw).await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/_matrix/client/v3/rooms/!r:hs\.test/send/m\.reaction/[^/]+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"event_id": "$re"})))
        .mount(&gw.homeserver.server)
        .await;
    let url = serve(&gw).await;
    let (mut watcher, _) = connect_async(url.as_str()).await.unwrap();

    send(&mut watcher, json!({"type": "join_room", "room_id": "!r:hs.test"})).await;
    wait_until(|| gw.registry.connection_count() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    gw.state
        .messaging
        .send_reaction("!r:hs.test", USER, "$m1", "🎉")
        .await
        .unwrap();

    let event = next_event(&mut watcher).await;
    assert_eq!(event["event"], "reaction_added");
    assert_eq!(event["data"]["related_event_id"], "$m1");
    assert_eq!(event["data"]["reaction_key"], "🎉");
}

#[tokio::test]
async fn request_sync_reports_completion() {
    let gw = gateway(None).await;
    mount_quiet_sync(&gw).await;
    let (mut socket, _) = connect_async(serve(&gw).await).await.unwrap();

    send(&mut socket, json!({"type": "join_user", "user_id": USER})).await;
    send(&mut socket, json!({"type": "request_sync"})).await;

    let mut names = Vec::new();
    while !names.contains(&"sync_complete".to_string()) {
        let event = next_event(&mut socket).await;
        names.push(event["event"].as_str().unwrap().to_string());
    }
    assert!(names.contains(&"rooms_updated".to_string()));
}
