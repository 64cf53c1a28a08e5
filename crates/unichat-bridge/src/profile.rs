// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-platform bridge bot profiles: bot identity, command vocabulary, and
//! the login dialogue each bot speaks.

use unichat_config::model::BridgesConfig;
use unichat_core::Platform;

use crate::grammar::Grammar;

/// How a bridge expects a login to proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStyle {
    /// QR image or phone pairing code.
    QrOrPairing,
    /// Phone number, then a verification code sent by the platform.
    PhoneAndCode,
    /// Browser session cookies pasted to the bot as JSON.
    Cookies {
        login_url: &'static str,
        /// Cookie names the bot cannot work without.
        required: &'static [&'static str],
        /// Send only `required` instead of the whole jar.
        required_only: bool,
        /// URL fragments seen after a successful browser login.
        success_hints: &'static [&'static str],
    },
}

/// Everything the engine needs to talk to one bridge bot.
#[derive(Debug, Clone)]
pub struct BridgeProfile {
    pub platform: Platform,
    pub bot_id: String,
    pub style: LoginStyle,
    pub login_command: &'static str,
    /// Alternative login command, used for phone pairing.
    pub pairing_command: Option<&'static str>,
    pub logout_command: &'static str,
    /// Status commands, tried in order until one gets a recognized reply.
    pub status_commands: &'static [&'static str],
    pub grammar: &'static Grammar,
}

impl BridgeProfile {
    fn new(platform: Platform, bot_id: &str) -> Self {
        let (style, login_command, pairing_command, status_commands): (_, _, _, &'static [&str]) =
            match platform {
                Platform::Whatsapp => (
                    LoginStyle::QrOrPairing,
                    "!wa login qr",
                    Some("!wa login phone"),
                    &["!wa list-logins"],
                ),
                Platform::Telegram => (
                    LoginStyle::PhoneAndCode,
                    "login",
                    None,
                    &["sync", "status", "whoami"],
                ),
                Platform::Instagram => (
                    LoginStyle::Cookies {
                        login_url: "https://www.instagram.com/accounts/login/",
                        required: &["sessionid"],
                        required_only: false,
                        success_hints: &["instagram.com/?", "instagram.com/direct"],
                    },
                    "login",
                    None,
                    &["status", "whoami", "info", "list-logins"],
                ),
                Platform::Twitter | Platform::Matrix => (
                    LoginStyle::Cookies {
                        login_url: "https://x.com/i/flow/login",
                        required: &["ct0", "auth_token"],
                        required_only: true,
                        success_hints: &["x.com/home", "twitter.com/home"],
                    },
                    "login",
                    None,
                    &["status", "whoami", "info"],
                ),
            };
        Self {
            platform,
            bot_id: bot_id.to_string(),
            style,
            login_command,
            pairing_command,
            logout_command: "logout",
            status_commands,
            grammar: Grammar::for_platform(platform),
        }
    }

    /// Name given to the control room created for this bridge.
    pub fn room_name(&self) -> String {
        format!("{} Bridge", self.platform.label())
    }

    pub fn room_topic(&self) -> String {
        format!("Control room for the {} bridge", self.platform.label())
    }
}

/// The four bridge profiles, keyed by platform.
#[derive(Debug, Clone)]
pub struct BridgeProfiles {
    profiles: Vec<BridgeProfile>,
}

impl BridgeProfiles {
    pub fn from_config(config: &BridgesConfig) -> Self {
        Self {
            profiles: vec![
                BridgeProfile::new(Platform::Whatsapp, &config.whatsapp_bot),
                BridgeProfile::new(Platform::Telegram, &config.telegram_bot),
                BridgeProfile::new(Platform::Instagram, &config.instagram_bot),
                BridgeProfile::new(Platform::Twitter, &config.twitter_bot),
            ],
        }
    }

    pub fn get(&self, platform: Platform) -> Option<&BridgeProfile> {
        self.profiles.iter().find(|p| p.platform == platform)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BridgeProfile> {
        self.profiles.iter()
    }

    /// Platform whose bot has exactly this user id.
    pub fn platform_of_bot(&self, user_id: &str) -> Option<Platform> {
        self.profiles
            .iter()
            .find(|p| p.bot_id == user_id)
            .map(|p| p.platform)
    }

    pub fn is_bot(&self, user_id: &str) -> bool {
        self.platform_of_bot(user_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_follow_config() {
        let config = BridgesConfig {
            telegram_bot: "@tg:example.org".into(),
            ..BridgesConfig::default()
        };
        let profiles = BridgeProfiles::from_config(&config);
        assert_eq!(profiles.iter().count(), 4);
        assert_eq!(profiles.platform_of_bot("@tg:example.org"), Some(Platform::Telegram));
        assert_eq!(
            profiles.platform_of_bot("@whatsappbot:matrix.localhost"),
            Some(Platform::Whatsapp)
        );
        assert!(profiles.get(Platform::Matrix).is_none());
        assert!(!profiles.is_bot("@alice:example.org"));
    }

    #[test]
    fn whatsapp_has_pairing_alternative() {
        let profiles = BridgeProfiles::from_config(&BridgesConfig::default());
        let wa = profiles.get(Platform::Whatsapp).unwrap();
        assert_eq!(wa.login_command, "!wa login qr");
        assert_eq!(wa.pairing_command, Some("!wa login phone"));
        assert_eq!(wa.room_name(), "Whatsapp Bridge");
    }

    #[test]
    fn twitter_sends_only_required_cookies() {
        let profiles = BridgeProfiles::from_config(&BridgesConfig::default());
        match profiles.get(Platform::Twitter).unwrap().style {
            LoginStyle::Cookies {
                required,
                required_only,
                ..
            } => {
                assert_eq!(required, &["ct0", "auth_token"]);
                assert!(required_only);
            }
            other => panic!("unexpected style {other:?}"),
        }
    }
}
