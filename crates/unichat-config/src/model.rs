// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Unichat gateway.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Unichat configuration.
///
/// Every section is optional and defaults to values suited for a local
/// homeserver at `http://localhost:8008`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UnichatConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// HTTP/WebSocket listener settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Chat server connection and credential.
    #[serde(default)]
    pub matrix: MatrixConfig,

    /// Bridge bot identities and dialogue polling.
    #[serde(default)]
    pub bridges: BridgesConfig,

    /// Long-poll sync loop tuning.
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "unichat".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer token for the HTTP API. `None` rejects every API request.
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Per-connection outbound event buffer.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            bearer_token: None,
            event_buffer: default_event_buffer(),
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[redacted]"),
            )
            .field("event_buffer", &self.event_buffer)
            .finish()
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_event_buffer() -> usize {
    64
}

/// Chat server settings. The access token is the single capability used for all calls.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MatrixConfig {
    #[serde(default = "default_homeserver_url")]
    pub homeserver_url: String,

    #[serde(default)]
    pub access_token: Option<String>,

    /// The gateway's own protocol identity.
    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// Enables password re-login when the server rejects the access token.
    #[serde(default)]
    pub password: Option<String>,

    /// Timeout for state reads and sends.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Long-poll window requested from the sync endpoint.
    #[serde(default = "default_sync_timeout_ms")]
    pub sync_timeout_ms: u64,

    /// HTTP timeout for a sync call; must exceed the long-poll window.
    #[serde(default = "default_sync_http_timeout_secs")]
    pub sync_http_timeout_secs: u64,

    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,

    #[serde(default = "default_media_check_timeout_secs")]
    pub media_check_timeout_secs: u64,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            homeserver_url: default_homeserver_url(),
            access_token: None,
            user_id: default_user_id(),
            password: None,
            request_timeout_secs: default_request_timeout_secs(),
            sync_timeout_ms: default_sync_timeout_ms(),
            sync_http_timeout_secs: default_sync_http_timeout_secs(),
            upload_timeout_secs: default_upload_timeout_secs(),
            media_check_timeout_secs: default_media_check_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for MatrixConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatrixConfig")
            .field("homeserver_url", &self.homeserver_url)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[redacted]"),
            )
            .field("user_id", &self.user_id)
            .field("password", &self.password.as_ref().map(|_| "[redacted]"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("sync_timeout_ms", &self.sync_timeout_ms)
            .field("sync_http_timeout_secs", &self.sync_http_timeout_secs)
            .field("upload_timeout_secs", &self.upload_timeout_secs)
            .field("media_check_timeout_secs", &self.media_check_timeout_secs)
            .finish()
    }
}

fn default_homeserver_url() -> String {
    "http://localhost:8008".to_string()
}

fn default_user_id() -> String {
    "@unichat:matrix.localhost".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_sync_timeout_ms() -> u64 {
    60_000
}

fn default_sync_http_timeout_secs() -> u64 {
    65
}

fn default_upload_timeout_secs() -> u64 {
    60
}

fn default_media_check_timeout_secs() -> u64 {
    5
}

/// Bridge bot identities and the bounds of every scripted dialogue.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgesConfig {
    #[serde(default = "default_whatsapp_bot")]
    pub whatsapp_bot: String,

    #[serde(default = "default_telegram_bot")]
    pub telegram_bot: String,

    #[serde(default = "default_instagram_bot")]
    pub instagram_bot: String,

    #[serde(default = "default_twitter_bot")]
    pub twitter_bot: String,

    /// Transcript reads per wait point.
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,

    /// Transcript reads while waiting for a pairing code or a login verdict.
    #[serde(default = "default_code_poll_attempts")]
    pub code_poll_attempts: u32,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Number of recent events read per transcript poll.
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,

    #[serde(default = "default_status_poll_attempts")]
    pub status_poll_attempts: u32,

    #[serde(default = "default_status_poll_interval_ms")]
    pub status_poll_interval_ms: u64,

    /// Pause between the cookie login command and the cookie payload.
    #[serde(default = "default_cookie_submit_delay_ms")]
    pub cookie_submit_delay_ms: u64,

    /// Lifetime of a pending verification session.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

impl Default for BridgesConfig {
    fn default() -> Self {
        Self {
            whatsapp_bot: default_whatsapp_bot(),
            telegram_bot: default_telegram_bot(),
            instagram_bot: default_instagram_bot(),
            twitter_bot: default_twitter_bot(),
            poll_attempts: default_poll_attempts(),
            code_poll_attempts: default_code_poll_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
            history_limit: default_history_limit(),
            status_poll_attempts: default_status_poll_attempts(),
            status_poll_interval_ms: default_status_poll_interval_ms(),
            cookie_submit_delay_ms: default_cookie_submit_delay_ms(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

fn default_whatsapp_bot() -> String {
    "@whatsappbot:matrix.localhost".to_string()
}

fn default_telegram_bot() -> String {
    "@telegrambot:matrix.localhost".to_string()
}

fn default_instagram_bot() -> String {
    "@metabot:matrix.localhost".to_string()
}

fn default_twitter_bot() -> String {
    "@twitterbot:matrix.localhost".to_string()
}

fn default_poll_attempts() -> u32 {
    15
}

fn default_code_poll_attempts() -> u32 {
    30
}

fn default_poll_interval_ms() -> u64 {
    3000
}

fn default_history_limit() -> u32 {
    20
}

fn default_status_poll_attempts() -> u32 {
    8
}

fn default_status_poll_interval_ms() -> u64 {
    2000
}

fn default_cookie_submit_delay_ms() -> u64 {
    3000
}

fn default_session_ttl_secs() -> u64 {
    600
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Delay before retrying after a non-timeout sync failure.
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,

    /// Events older than this are not re-emitted from a gapped (`limited`) timeline.
    #[serde(default = "default_stale_event_window_secs")]
    pub stale_event_window_secs: u64,

    /// Timeline events fetched per room when listing rooms.
    #[serde(default = "default_room_list_timeline_limit")]
    pub room_list_timeline_limit: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            error_backoff_ms: default_error_backoff_ms(),
            stale_event_window_secs: default_stale_event_window_secs(),
            room_list_timeline_limit: default_room_list_timeline_limit(),
        }
    }
}

fn default_error_backoff_ms() -> u64 {
    5000
}

fn default_stale_event_window_secs() -> u64 {
    60
}

fn default_room_list_timeline_limit() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = UnichatConfig::default();
        assert_eq!(config.service.name, "unichat");
        assert_eq!(config.gateway.port, 3001);
        assert_eq!(config.matrix.request_timeout_secs, 10);
        assert_eq!(config.matrix.sync_timeout_ms, 60_000);
        assert_eq!(config.matrix.sync_http_timeout_secs, 65);
        assert_eq!(config.bridges.instagram_bot, "@metabot:matrix.localhost");
        assert_eq!(config.bridges.session_ttl_secs, 600);
        assert_eq!(config.sync.error_backoff_ms, 5000);
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = UnichatConfig::default();
        config.matrix.access_token = Some("syt_secret".into());
        config.matrix.password = Some("hunter2".into());
        config.gateway.bearer_token = Some("api-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("syt_secret"));
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("api-secret"));
        assert!(debug.contains("[redacted]"));
    }

    #[test]
    fn unknown_bridge_key_is_rejected() {
        let result = toml::from_str::<UnichatConfig>("[bridges]\nsignal_bot = \"@x:y\"\n");
        assert!(result.is_err());
    }
}
