// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::UnichatConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &UnichatConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.service.log_level.as_str()) {
        errors.push(ConfigError::validation(format!(
            "service.log_level `{}` must be one of {}",
            config.service.log_level,
            LOG_LEVELS.join(", ")
        )));
    }

    if config.gateway.host.trim().is_empty() {
        errors.push(ConfigError::validation("gateway.host must not be empty"));
    }

    if config.gateway.event_buffer == 0 {
        errors.push(ConfigError::validation(
            "gateway.event_buffer must be greater than zero",
        ));
    }

    let url = config.matrix.homeserver_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        errors.push(ConfigError::validation(format!(
            "matrix.homeserver_url `{url}` must start with http:// or https://"
        )));
    }

    let ids = [
        ("matrix.user_id", &config.matrix.user_id),
        ("bridges.whatsapp_bot", &config.bridges.whatsapp_bot),
        ("bridges.telegram_bot", &config.bridges.telegram_bot),
        ("bridges.instagram_bot", &config.bridges.instagram_bot),
        ("bridges.twitter_bot", &config.bridges.twitter_bot),
    ];
    for (key, id) in ids {
        if !is_user_id(id) {
            errors.push(ConfigError::validation(format!(
                "{key} `{id}` must look like @localpart:server"
            )));
        }
    }

    if config.matrix.sync_http_timeout_secs * 1000 <= config.matrix.sync_timeout_ms {
        errors.push(ConfigError::validation(format!(
            "matrix.sync_http_timeout_secs ({}s) must exceed matrix.sync_timeout_ms ({}ms)",
            config.matrix.sync_http_timeout_secs, config.matrix.sync_timeout_ms
        )));
    }

    let positive = [
        ("matrix.request_timeout_secs", config.matrix.request_timeout_secs),
        ("matrix.upload_timeout_secs", config.matrix.upload_timeout_secs),
        (
            "matrix.media_check_timeout_secs",
            config.matrix.media_check_timeout_secs,
        ),
        ("bridges.poll_attempts", u64::from(config.bridges.poll_attempts)),
        (
            "bridges.code_poll_attempts",
            u64::from(config.bridges.code_poll_attempts),
        ),
        ("bridges.history_limit", u64::from(config.bridges.history_limit)),
        (
            "bridges.status_poll_attempts",
            u64::from(config.bridges.status_poll_attempts),
        ),
        ("bridges.session_ttl_secs", config.bridges.session_ttl_secs),
        (
            "sync.room_list_timeline_limit",
            u64::from(config.sync.room_list_timeline_limit),
        ),
    ];
    for (key, value) in positive {
        if value == 0 {
            errors.push(ConfigError::validation(format!(
                "{key} must be greater than zero"
            )));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// `@localpart:server` with both halves non-empty.
fn is_user_id(id: &str) -> bool {
    id.strip_prefix('@')
        .and_then(|rest| rest.split_once(':'))
        .is_some_and(|(local, server)| !local.is_empty() && !server.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&UnichatConfig::default()).is_ok());
    }

    #[test]
    fn user_id_shape() {
        assert!(is_user_id("@whatsappbot:matrix.localhost"));
        assert!(!is_user_id("whatsappbot:matrix.localhost"));
        assert!(!is_user_id("@:matrix.localhost"));
        assert!(!is_user_id("@bot"));
    }

    #[test]
    fn collects_all_errors() {
        let mut config = UnichatConfig::default();
        config.matrix.homeserver_url = "localhost:8008".into();
        config.bridges.telegram_bot = "telegrambot".into();
        config.bridges.poll_attempts = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn sync_http_timeout_must_cover_long_poll() {
        let mut config = UnichatConfig::default();
        config.matrix.sync_http_timeout_secs = 60;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(
            |e| matches!(e, ConfigError::Validation { message } if message.contains("sync_http_timeout_secs"))
        ));
    }
}
