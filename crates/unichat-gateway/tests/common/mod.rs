// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway wired to a mock homeserver.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use unichat_bridge::{
    BridgeEngine, BridgeProfiles, Classifier, PlatformStatusStore, Polling, SessionStore,
};
use unichat_config::model::BridgesConfig;
use unichat_gateway::{AuthConfig, Dispatcher, GatewayState, HealthState, Registry};
use unichat_matrix::MatrixUploader;
use unichat_sync::{MessagingService, Summarizer, SyncEngine, SyncSettings};
use unichat_test_utils::MockHomeserver;

pub const API_TOKEN: &str = "api-token";

pub struct TestGateway {
    pub homeserver: MockHomeserver,
    pub state: GatewayState,
    pub registry: Arc<Registry>,
    pub statuses: Arc<PlatformStatusStore>,
    pub sync: Arc<SyncEngine>,
}

pub async fn gateway(bearer_token: Option<&str>) -> TestGateway {
    let homeserver = MockHomeserver::start().await;
    let client = homeserver.client();
    let profiles = Arc::new(BridgeProfiles::from_config(&BridgesConfig::default()));
    let registry = Arc::new(Registry::new());
    let statuses = Arc::new(PlatformStatusStore::new());

    let settings = SyncSettings {
        timeout_ms: 0,
        error_backoff: Duration::from_millis(20),
        stale_window: Duration::from_secs(60),
        room_list_timeline_limit: 1,
    };
    let summarizer = || {
        Summarizer::new(
            client.clone(),
            Classifier::new(client.clone(), Arc::clone(&profiles)),
        )
    };
    let sync = Arc::new(SyncEngine::new(
        client.clone(),
        summarizer(),
        registry.clone(),
        settings,
    ));
    let messaging = Arc::new(MessagingService::new(
        client.clone(),
        summarizer(),
        Arc::new(MatrixUploader::new(client.clone())),
        registry.clone(),
        settings,
    ));
    let bridges = Arc::new(BridgeEngine::new(
        client.clone(),
        Arc::clone(&profiles),
        Arc::new(SessionStore::new(Duration::from_secs(600))),
        Arc::clone(&statuses),
        registry.clone(),
        Polling {
            attempts: 2,
            code_attempts: 2,
            interval: Duration::from_millis(5),
            history_limit: 20,
            status_attempts: 2,
            status_interval: Duration::from_millis(5),
            cookie_delay: Duration::ZERO,
        },
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        registry.clone(),
        sync.clone(),
        statuses.clone(),
    ));

    let state = GatewayState {
        bridges,
        messaging,
        dispatcher,
        auth: AuthConfig {
            bearer_token: bearer_token.map(str::to_string),
        },
        health: HealthState {
            start_time: std::time::Instant::now(),
        },
        event_buffer: 16,
    };

    TestGateway {
        homeserver,
        state,
        registry,
        statuses,
        sync,
    }
}
