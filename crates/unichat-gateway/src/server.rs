// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use unichat_bridge::BridgeEngine;
use unichat_core::UnichatError;
use unichat_sync::MessagingService;

use crate::auth::{AuthConfig, auth_middleware};
use crate::dispatcher::Dispatcher;
use crate::handlers;
use crate::ws;

/// Upper bound on a multipart message body.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Health state for the unauthenticated health endpoint.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub bridges: Arc<BridgeEngine>,
    pub messaging: Arc<MessagingService>,
    pub dispatcher: Arc<Dispatcher>,
    /// Authentication configuration.
    pub auth: AuthConfig,
    pub health: HealthState,
    /// Outbound frame buffer per WebSocket connection.
    pub event_buffer: usize,
}

/// Gateway server configuration (mirrors GatewayConfig from unichat-config).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Builds the gateway router:
/// - GET /health (public)
/// - /v1/bridges/..., /v1/rooms/..., /v1/groups, /v1/users/search (bearer auth)
/// - GET /ws (realtime events; users identify themselves with `join_user`)
pub fn router(state: GatewayState) -> Router {
    let auth_state = state.auth.clone();

    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/bridges/verify", post(handlers::post_verify))
        .route("/v1/bridges/status", get(handlers::get_all_status))
        .route("/v1/bridges/{platform}/login", post(handlers::post_login))
        .route("/v1/bridges/{platform}/status", get(handlers::get_status))
        .route(
            "/v1/bridges/{platform}/disconnect",
            post(handlers::post_disconnect),
        )
        .route("/v1/rooms", get(handlers::get_rooms))
        .route(
            "/v1/rooms/{room}/messages",
            get(handlers::get_messages)
                .post(handlers::post_message)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/v1/rooms/{room}/history", get(handlers::get_history))
        .route("/v1/rooms/{room}/reactions", post(handlers::post_reaction))
        .route("/v1/rooms/{room}/leave", post(handlers::post_leave))
        .route("/v1/groups", post(handlers::post_group))
        .route("/v1/users/search", post(handlers::post_search))
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state.clone());

    let ws_routes = Router::new()
        .route("/ws", get(ws::ws_handler))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .merge(ws_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Binds and serves the gateway until `shutdown` resolves.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), UnichatError> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| UnichatError::Transport {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("Gateway server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| UnichatError::Transport {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })?;

    Ok(())
}
