// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `unichat serve`: wires the protocol client, engines, and gateway together
//! and runs until SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use unichat_bridge::{
    BridgeEngine, BridgeProfiles, Classifier, PlatformStatusStore, Polling, SessionStore,
};
use unichat_config::UnichatConfig;
use unichat_core::{ServiceAdapter, UnichatError};
use unichat_gateway::{
    AuthConfig, Dispatcher, GatewayState, HealthState, Registry, ServerConfig, start_server,
};
use unichat_matrix::{FallbackUploader, MatrixClient, MatrixUploader};
use unichat_sync::{MessagingService, Summarizer, SyncEngine, SyncSettings};

/// How often expired verification sessions are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Everything the gateway serves, built from config.
pub struct Services {
    pub state: GatewayState,
    pub sessions: Arc<SessionStore>,
    pub dispatcher: Arc<Dispatcher>,
}

/// Builds the client, stores, and engines, and the gateway state over them.
pub fn build_services(config: &UnichatConfig) -> Result<Services, UnichatError> {
    let client = MatrixClient::from_config(&config.matrix)?;
    let profiles = Arc::new(BridgeProfiles::from_config(&config.bridges));
    let registry = Arc::new(Registry::new());
    let sessions = Arc::new(SessionStore::new(Duration::from_secs(
        config.bridges.session_ttl_secs,
    )));
    let statuses = Arc::new(PlatformStatusStore::new());
    let settings = SyncSettings::from_config(&config.matrix, &config.sync);

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
    let uploader = FallbackUploader::new(Arc::new(MatrixUploader::new(client.clone())));
    let messaging = Arc::new(MessagingService::new(
        client.clone(),
        summarizer(),
        Arc::new(uploader),
        registry.clone(),
        settings,
    ));
    let bridges = Arc::new(BridgeEngine::new(
        client.clone(),
        Arc::clone(&profiles),
        Arc::clone(&sessions),
        Arc::clone(&statuses),
        registry.clone(),
        Polling::from_config(&config.bridges),
    ));
    let dispatcher = Arc::new(Dispatcher::new(registry, sync, statuses));

    let state = GatewayState {
        bridges,
        messaging,
        dispatcher: Arc::clone(&dispatcher),
        auth: AuthConfig {
            bearer_token: config.gateway.bearer_token.clone(),
        },
        health: HealthState {
            start_time: std::time::Instant::now(),
        },
        event_buffer: config.gateway.event_buffer,
    };

    Ok(Services {
        state,
        sessions,
        dispatcher,
    })
}

/// Runs the `unichat serve` command.
pub async fn run_serve(config: UnichatConfig) -> Result<(), UnichatError> {
    init_tracing(&config.service.log_level);
    info!(homeserver = %config.matrix.homeserver_url, "starting unichat serve");

    if config.gateway.bearer_token.is_none() {
        warn!("gateway.bearer_token is not set -- every HTTP API request will be rejected");
    }

    let services = build_services(&config)?;
    let cancel = install_signal_handler();

    let sweeper = Arc::clone(&services.sessions).spawn_sweeper(SWEEP_INTERVAL, cancel.clone());

    let server_config = ServerConfig {
        host: config.gateway.host.clone(),
        port: config.gateway.port,
    };
    let shutdown = cancel.clone();
    let served = start_server(&server_config, services.state, async move {
        shutdown.cancelled().await;
    })
    .await;

    cancel.cancel();
    if let Err(e) = services.dispatcher.shutdown().await {
        warn!(error = %e, "dispatcher shutdown failed");
    }
    if let Err(e) = sweeper.await {
        debug!(error = %e, "session sweeper ended abnormally");
    }

    info!("unichat serve shutdown complete");
    served
}

/// Cancels the returned token on SIGINT or SIGTERM.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => info!("received SIGINT (Ctrl+C), initiating shutdown"),
                        _ = sigterm.recv() => info!("received SIGTERM, initiating shutdown"),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl+C only");
                    let _ = ctrl_c.await;
                    info!("received Ctrl+C, initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
    });

    token
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("unichat={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
