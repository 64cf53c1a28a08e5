// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Lookup order: `/etc/unichat/unichat.toml`, `~/.config/unichat/unichat.toml`,
//! `./unichat.toml`, then `UNICHAT_` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::UnichatConfig;

/// System-wide config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/unichat/unichat.toml";

/// Config file in the working directory.
pub const LOCAL_CONFIG_PATH: &str = "unichat.toml";

/// Top-level sections addressable from the environment.
const ENV_SECTIONS: &[&str] = &["service", "gateway", "matrix", "bridges", "sync"];

/// User config file under the platform config dir, if one exists.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("unichat/unichat.toml"))
}

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/unichat/unichat.toml`
/// 3. `~/.config/unichat/unichat.toml`
/// 4. `./unichat.toml`
/// 5. `UNICHAT_*` environment variables
pub fn load_config() -> Result<UnichatConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only. Used by tests.
pub fn load_config_from_str(toml_content: &str) -> Result<UnichatConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(UnichatConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from an explicit file with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<UnichatConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(UnichatConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The full layered Figment, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(UnichatConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// Environment provider mapping `UNICHAT_<SECTION>_<KEY>` to `<section>.<key>`.
///
/// Only the leading section name is split off, so
/// `UNICHAT_MATRIX_SYNC_TIMEOUT_MS` maps to `matrix.sync_timeout_ms`.
fn env_provider() -> Env {
    Env::prefixed("UNICHAT_").map(|key| map_env_key(key.as_str()).into())
}

fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_split_on_section_only() {
        assert_eq!(
            map_env_key("matrix_sync_timeout_ms"),
            "matrix.sync_timeout_ms"
        );
        assert_eq!(
            map_env_key("bridges_whatsapp_bot"),
            "bridges.whatsapp_bot"
        );
        assert_eq!(map_env_key("sync_error_backoff_ms"), "sync.error_backoff_ms");
        assert_eq!(map_env_key("gateway_port"), "gateway.port");
    }

    #[test]
    fn unknown_prefix_is_left_alone() {
        assert_eq!(map_env_key("unrelated"), "unrelated");
    }

    #[test]
    fn string_overrides_defaults() {
        let config = load_config_from_str("[gateway]\nport = 9000\n").unwrap();
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.gateway.host, "127.0.0.1");
    }
}
