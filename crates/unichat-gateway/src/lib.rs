// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP/WebSocket gateway for Unichat.
//!
//! The HTTP routes are a thin layer over [`unichat_bridge::BridgeEngine`] and
//! [`unichat_sync::MessagingService`]. The WebSocket endpoint feeds the
//! [`Dispatcher`], whose [`Registry`] is the event sink every engine emits
//! into.

pub mod auth;
pub mod dispatcher;
pub mod handlers;
pub mod server;
pub mod ws;

pub use auth::AuthConfig;
pub use dispatcher::{ConnectionId, Dispatcher, Registry};
pub use server::{GatewayState, HealthState, ServerConfig, router, start_server};
