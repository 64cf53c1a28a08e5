// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bridge session engine.
//!
//! Drives the text dialogue with each platform's bridge bot: send a command
//! into the bot's direct room, then read the room's transcript back at a fixed
//! interval until the bot says something meaningful for the current step.
//! Every wait is bounded and every failure becomes a structured result.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use unichat_config::model::BridgesConfig;
use unichat_core::types::PlatformStatusChanged;
use unichat_core::{
    CookieSource, EventSink, Platform, PlatformStatus, RealtimeEvent, SessionId, UnichatError,
};
use unichat_matrix::types::RoomEvent;
use unichat_matrix::{MatrixClient, MediaResolver};

use crate::grammar::{self, Marker};
use crate::profile::{BridgeProfile, BridgeProfiles, LoginStyle};
use crate::qr;
use crate::store::{PlatformStatusStore, SessionStore};

/// Poll budgets for bridge dialogues.
#[derive(Debug, Clone, Copy)]
pub struct Polling {
    pub attempts: u32,
    pub code_attempts: u32,
    pub interval: Duration,
    pub history_limit: u32,
    pub status_attempts: u32,
    pub status_interval: Duration,
    pub cookie_delay: Duration,
}

impl Polling {
    pub fn from_config(config: &BridgesConfig) -> Self {
        Self {
            attempts: config.poll_attempts,
            code_attempts: config.code_poll_attempts,
            interval: Duration::from_millis(config.poll_interval_ms),
            history_limit: config.history_limit,
            status_attempts: config.status_poll_attempts,
            status_interval: Duration::from_millis(config.status_poll_interval_ms),
            cookie_delay: Duration::from_millis(config.cookie_submit_delay_ms),
        }
    }
}

impl Default for Polling {
    fn default() -> Self {
        Self::from_config(&BridgesConfig::default())
    }
}

// --- Request and result types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginMethod {
    Qr,
    Phone,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginOptions {
    #[serde(default)]
    pub method: Option<LoginMethod>,
    #[serde(default)]
    pub phone_number: Option<String>,
    /// Browser session cookies for cookie-based bridges.
    #[serde(default)]
    pub cookies: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QrSource {
    /// Image sent by the bot and reachable through the media repository.
    Attachment,
    /// Rendered locally from a link or raw payload in the bot's text.
    Generated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    BridgeError,
    Protocol,
    InvalidInput,
    Unsupported,
    SessionNotFound,
}

/// Where a login or verification attempt ended up.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoginOutcome {
    /// The bot wants a phone number; start the login again with one.
    PhoneRequest { room_id: String },
    /// A verification session is open. `code` is set when the bot issued a
    /// pairing code for the user to type on their phone.
    CodeRequest {
        session_id: SessionId,
        room_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    QrReady {
        qr_url: String,
        source: QrSource,
        room_id: String,
    },
    AlreadyConnected,
    Success {
        #[serde(skip_serializing_if = "Option::is_none")]
        account: Option<String>,
    },
    Failure { reason: FailureReason },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginResult {
    pub success: bool,
    pub platform: Platform,
    pub message: String,
    #[serde(flatten)]
    pub outcome: LoginOutcome,
}

impl LoginResult {
    fn from_outcome(platform: Platform, outcome: LoginOutcome) -> Self {
        let label = platform.label();
        let message = match &outcome {
            LoginOutcome::PhoneRequest { .. } => {
                format!("Send your phone number to continue the {label} login")
            }
            LoginOutcome::CodeRequest { code: Some(code), .. } => {
                format!("Enter pairing code {code} in {label} on your phone")
            }
            LoginOutcome::CodeRequest { code: None, .. } => {
                format!("Enter the verification code sent by {label}")
            }
            LoginOutcome::QrReady { .. } => format!("Scan the QR code with {label}"),
            LoginOutcome::AlreadyConnected => format!("{label} is already connected"),
            LoginOutcome::Success { .. } => format!("{label} connected"),
            LoginOutcome::Failure { .. } => format!("{label} login failed"),
        };
        Self {
            success: !matches!(outcome, LoginOutcome::Failure { .. }),
            platform,
            message,
            outcome,
        }
    }

    fn failed(platform: Platform, error: &UnichatError) -> Self {
        Self {
            success: false,
            platform,
            message: error.to_string(),
            outcome: LoginOutcome::Failure {
                reason: failure_reason(error),
            },
        }
    }
}

/// Result of submitting a verification code.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResult {
    pub success: bool,
    /// Absent when the session id was unknown.
    pub platform: Option<Platform>,
    pub message: String,
    #[serde(flatten)]
    pub outcome: LoginOutcome,
}

impl From<LoginResult> for VerificationResult {
    fn from(result: LoginResult) -> Self {
        Self {
            success: result.success,
            platform: Some(result.platform),
            message: result.message,
            outcome: result.outcome,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Connected,
    Disconnected,
    BridgeError,
    Timeout,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub success: bool,
    pub platform: Platform,
    pub status: LinkState,
    pub connected: bool,
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// Bot reply the status was read from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisconnectResult {
    pub success: bool,
    pub platform: Platform,
    pub message: String,
}

fn failure_reason(error: &UnichatError) -> FailureReason {
    match error {
        UnichatError::BridgeTimeout { .. } | UnichatError::Timeout { .. } => FailureReason::Timeout,
        UnichatError::Bridge { .. } => FailureReason::BridgeError,
        UnichatError::InvalidInput(_) => FailureReason::InvalidInput,
        UnichatError::Unsupported(_) => FailureReason::Unsupported,
        UnichatError::SessionNotFound(_) => FailureReason::SessionNotFound,
        _ => FailureReason::Protocol,
    }
}

// --- Dialogue plumbing ---

/// An open conversation with one bot. Replies are read after `anchor`.
struct Dialogue<'a> {
    profile: &'a BridgeProfile,
    room_id: String,
    anchor: String,
}

/// A bot reply as seen by a decision closure.
#[derive(Debug)]
struct BotReply {
    body: String,
    image: Option<ImageReply>,
}

#[derive(Debug)]
struct ImageReply {
    url: String,
    fetchable: bool,
}

#[derive(Debug, Clone, Copy)]
struct Wait {
    attempts: u32,
    interval: Duration,
    stage: &'static str,
}

/// Drives bridge bot dialogues and owns the link state they produce.
pub struct BridgeEngine {
    client: MatrixClient,
    profiles: Arc<BridgeProfiles>,
    sessions: Arc<SessionStore>,
    statuses: Arc<PlatformStatusStore>,
    sink: Arc<dyn EventSink>,
    cookies: Option<Arc<dyn CookieSource>>,
    polling: Polling,
}

impl BridgeEngine {
    pub fn new(
        client: MatrixClient,
        profiles: Arc<BridgeProfiles>,
        sessions: Arc<SessionStore>,
        statuses: Arc<PlatformStatusStore>,
        sink: Arc<dyn EventSink>,
        polling: Polling,
    ) -> Self {
        Self {
            client,
            profiles,
            sessions,
            statuses,
            sink,
            cookies: None,
            polling,
        }
    }

    /// Enables cookie-based logins without caller-supplied cookies.
    pub fn with_cookie_source(mut self, source: Arc<dyn CookieSource>) -> Self {
        self.cookies = Some(source);
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn statuses(&self) -> &Arc<PlatformStatusStore> {
        &self.statuses
    }

    // --- Login ---

    /// Starts linking `platform` for `user_id`.
    pub async fn start_login(
        &self,
        platform: Platform,
        user_id: &str,
        options: LoginOptions,
    ) -> LoginResult {
        let Some(profile) = self.profiles.get(platform) else {
            return LoginResult::failed(
                platform,
                &UnichatError::InvalidInput(format!("{platform} is not a bridged platform")),
            );
        };
        info!(%platform, user_id, "starting bridge login");

        let attempt = match profile.style {
            LoginStyle::QrOrPairing => self.login_qr_or_pairing(profile, user_id, &options).await,
            LoginStyle::PhoneAndCode => self.login_phone(profile, user_id, &options).await,
            LoginStyle::Cookies { .. } => self.login_cookies(profile, &options).await,
        };

        match attempt {
            Ok(outcome) => {
                if matches!(
                    outcome,
                    LoginOutcome::Success { .. } | LoginOutcome::AlreadyConnected
                ) {
                    self.record_status(platform, user_id, true);
                }
                LoginResult::from_outcome(platform, outcome)
            }
            Err(e) => {
                warn!(%platform, user_id, error = %e, "bridge login failed");
                LoginResult::failed(platform, &e)
            }
        }
    }

    async fn login_qr_or_pairing(
        &self,
        profile: &BridgeProfile,
        user_id: &str,
        options: &LoginOptions,
    ) -> Result<LoginOutcome, UnichatError> {
        let method = options.method.unwrap_or(if options.phone_number.is_some() {
            LoginMethod::Phone
        } else {
            LoginMethod::Qr
        });
        match method {
            LoginMethod::Qr => {
                let mut dialogue = self.open_dialogue(profile).await?;
                self.qr_login(&mut dialogue).await
            }
            LoginMethod::Phone => {
                let phone = options.phone_number.as_deref().ok_or_else(|| {
                    UnichatError::InvalidInput("phone_number is required for phone pairing".into())
                })?;
                let phone = normalize_phone(phone)?;
                let mut dialogue = self.open_dialogue(profile).await?;
                self.pairing_login(&mut dialogue, user_id, phone).await
            }
        }
    }

    async fn qr_login(&self, dialogue: &mut Dialogue<'_>) -> Result<LoginOutcome, UnichatError> {
        let profile = dialogue.profile;
        let platform = profile.platform;
        self.say(dialogue, profile.login_command).await?;

        let room_id = dialogue.room_id.clone();
        let mut instructions_only = false;
        let waited = self
            .poll(dialogue, self.login_wait("QR code"), |reply| {
                if let Some(image) = &reply.image {
                    return image.fetchable.then(|| {
                        Ok(LoginOutcome::QrReady {
                            qr_url: image.url.clone(),
                            source: QrSource::Attachment,
                            room_id: room_id.clone(),
                        })
                    });
                }
                let marker = profile.grammar.classify(&reply.body);
                if marker == Some(Marker::Error) {
                    return Some(Err(bridge_error(platform, &reply.body)));
                }
                if let Some(payload) = grammar::extract_qr_payload(&reply.body) {
                    return Some(qr::render_data_url(&payload).map(|qr_url| {
                        LoginOutcome::QrReady {
                            qr_url,
                            source: QrSource::Generated,
                            room_id: room_id.clone(),
                        }
                    }));
                }
                match marker? {
                    Marker::AlreadyConnected | Marker::Success => {
                        Some(Ok(LoginOutcome::AlreadyConnected))
                    }
                    Marker::PhoneRequest => Some(Ok(LoginOutcome::PhoneRequest {
                        room_id: room_id.clone(),
                    })),
                    Marker::QrHint => {
                        instructions_only = true;
                        None
                    }
                    _ => None,
                }
            })
            .await;

        match waited {
            Ok(outcome) => outcome,
            Err(UnichatError::BridgeTimeout { .. }) if instructions_only => {
                Err(UnichatError::Bridge {
                    platform,
                    message: "the bridge sent QR instructions without a scannable code; \
                              try phone pairing instead"
                        .into(),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn pairing_login(
        &self,
        dialogue: &mut Dialogue<'_>,
        user_id: &str,
        phone: String,
    ) -> Result<LoginOutcome, UnichatError> {
        let profile = dialogue.profile;
        let platform = profile.platform;
        let command = profile.pairing_command.unwrap_or(profile.login_command);
        self.say(dialogue, command).await?;

        let asked = self
            .poll(dialogue, self.login_wait("phone number prompt"), |reply| {
                match profile.grammar.classify(&reply.body)? {
                    Marker::Error => Some(Err(bridge_error(platform, &reply.body))),
                    Marker::AlreadyConnected | Marker::Success => Some(Ok(false)),
                    Marker::PhoneRequest => Some(Ok(true)),
                    _ => None,
                }
            })
            .await??;
        if !asked {
            return Ok(LoginOutcome::AlreadyConnected);
        }

        self.say(dialogue, &phone).await?;
        let step = self
            .poll(dialogue, self.code_wait("pairing code"), |reply| {
                match profile.grammar.classify(&reply.body)? {
                    Marker::Error => Some(Err(bridge_error(platform, &reply.body))),
                    Marker::AlreadyConnected | Marker::Success => Some(Ok(Step::Connected(
                        grammar::extract_account(&reply.body),
                    ))),
                    Marker::CodeIssued => {
                        grammar::extract_code(&reply.body).map(|code| Ok(Step::Code(Some(code))))
                    }
                    _ => None,
                }
            })
            .await??;
        Ok(self.conclude(dialogue, user_id, Some(phone), step))
    }

    async fn login_phone(
        &self,
        profile: &BridgeProfile,
        user_id: &str,
        options: &LoginOptions,
    ) -> Result<LoginOutcome, UnichatError> {
        let platform = profile.platform;
        let phone = options
            .phone_number
            .as_deref()
            .map(normalize_phone)
            .transpose()?;

        let mut dialogue = self.open_dialogue(profile).await?;
        self.say(&mut dialogue, profile.login_command).await?;
        let prompt = self
            .poll(&dialogue, self.login_wait("login prompt"), |reply| {
                match profile.grammar.classify(&reply.body)? {
                    Marker::Error => Some(Err(bridge_error(platform, &reply.body))),
                    Marker::AlreadyConnected | Marker::Success => {
                        Some(Ok(Step::Connected(grammar::extract_account(&reply.body))))
                    }
                    Marker::CodeRequest => Some(Ok(Step::Code(None))),
                    Marker::PhoneRequest => Some(Ok(Step::Phone)),
                    _ => None,
                }
            })
            .await??;

        let step = match (prompt, phone.as_deref()) {
            (Step::Connected(_), _) => return Ok(LoginOutcome::AlreadyConnected),
            (Step::Phone, None) => {
                return Ok(LoginOutcome::PhoneRequest {
                    room_id: dialogue.room_id.clone(),
                });
            }
            (Step::Phone, Some(number)) => {
                self.say(&mut dialogue, number).await?;
                self.poll(&dialogue, self.code_wait("verification code prompt"), |reply| {
                    match profile.grammar.classify(&reply.body)? {
                        Marker::Error => Some(Err(bridge_error(platform, &reply.body))),
                        Marker::AlreadyConnected | Marker::Success => {
                            Some(Ok(Step::Connected(grammar::extract_account(&reply.body))))
                        }
                        Marker::CodeRequest => Some(Ok(Step::Code(None))),
                        _ => None,
                    }
                })
                .await??
            }
            (step, _) => step,
        };
        Ok(self.conclude(&dialogue, user_id, phone, step))
    }

    async fn login_cookies(
        &self,
        profile: &BridgeProfile,
        options: &LoginOptions,
    ) -> Result<LoginOutcome, UnichatError> {
        let platform = profile.platform;
        let LoginStyle::Cookies {
            login_url,
            required,
            required_only,
            success_hints,
        } = profile.style
        else {
            return Err(UnichatError::Internal(format!(
                "{platform} does not log in with cookies"
            )));
        };

        let jar = match (&options.cookies, &self.cookies) {
            (Some(cookies), _) => cookies.clone(),
            (None, Some(source)) => {
                source
                    .acquire_session_cookies(login_url, success_hints)
                    .await?
            }
            (None, None) => {
                return Err(UnichatError::Unsupported(format!(
                    "{} login needs session cookies and no browser is available",
                    platform.label()
                )));
            }
        };
        let payload = cookie_payload(&jar, required, required_only)?;

        let mut dialogue = self.open_dialogue(profile).await?;
        self.say(&mut dialogue, profile.login_command).await?;
        tokio::time::sleep(self.polling.cookie_delay).await;
        self.say(&mut dialogue, &payload).await?;

        self.poll(&dialogue, self.code_wait("cookie login verdict"), |reply| {
            match profile.grammar.classify(&reply.body)? {
                Marker::Error => Some(Err(bridge_error(platform, &reply.body))),
                Marker::AlreadyConnected => Some(Ok(LoginOutcome::AlreadyConnected)),
                Marker::Success | Marker::StatusConnected => Some(Ok(LoginOutcome::Success {
                    account: grammar::extract_account(&reply.body),
                })),
                _ => None,
            }
        })
        .await?
    }

    /// Turns the last dialogue step into an outcome, opening a verification
    /// session when a code is pending.
    fn conclude(
        &self,
        dialogue: &Dialogue<'_>,
        user_id: &str,
        phone: Option<String>,
        step: Step,
    ) -> LoginOutcome {
        match step {
            Step::Connected(account) => LoginOutcome::Success { account },
            Step::Phone => LoginOutcome::PhoneRequest {
                room_id: dialogue.room_id.clone(),
            },
            Step::Code(code) => {
                let session_id = self.sessions.create(
                    user_id,
                    dialogue.profile.platform,
                    &dialogue.room_id,
                    phone,
                    &dialogue.anchor,
                );
                LoginOutcome::CodeRequest {
                    session_id,
                    room_id: dialogue.room_id.clone(),
                    code,
                }
            }
        }
    }

    // --- Verification ---

    /// Forwards `code` verbatim to the session's bot and waits for the verdict.
    ///
    /// An empty code only waits, for pairing flows where the user confirms on
    /// their phone. The session survives failures so the code can be retried.
    pub async fn submit_verification(&self, session_id: &SessionId, code: &str) -> VerificationResult {
        let Some(session) = self.sessions.get(session_id) else {
            return VerificationResult {
                success: false,
                platform: None,
                message: "Invalid session. Please restart the login process.".into(),
                outcome: LoginOutcome::Failure {
                    reason: FailureReason::SessionNotFound,
                },
            };
        };
        let platform = session.platform;
        let Some(profile) = self.profiles.get(platform) else {
            return LoginResult::failed(
                platform,
                &UnichatError::Internal(format!("no bridge profile for {platform}")),
            )
            .into();
        };

        let mut dialogue = Dialogue {
            profile,
            room_id: session.room_id.clone(),
            anchor: session.anchor_event_id.clone(),
        };
        let verdict = self.verify(&mut dialogue, &session.id, code.trim()).await;

        match verdict {
            Ok(account) => {
                self.sessions.remove(&session.id);
                self.record_status(platform, &session.user_id, true);
                info!(%platform, user_id = %session.user_id, "bridge verification succeeded");
                LoginResult::from_outcome(platform, LoginOutcome::Success { account }).into()
            }
            Err(e) => {
                warn!(%platform, session_id = %session.id, error = %e, "bridge verification failed");
                LoginResult::failed(platform, &e).into()
            }
        }
    }

    async fn verify(
        &self,
        dialogue: &mut Dialogue<'_>,
        session_id: &SessionId,
        code: &str,
    ) -> Result<Option<String>, UnichatError> {
        let profile = dialogue.profile;
        let platform = profile.platform;
        if !code.is_empty() {
            self.say(dialogue, code).await?;
            self.sessions.set_anchor(session_id, &dialogue.anchor);
        }
        self.poll(dialogue, self.code_wait("verification result"), |reply| {
            match profile.grammar.classify(&reply.body)? {
                Marker::Error => Some(Err(bridge_error(platform, &reply.body))),
                Marker::Success | Marker::AlreadyConnected | Marker::StatusConnected => {
                    Some(Ok(grammar::extract_account(&reply.body)))
                }
                _ => None,
            }
        })
        .await?
    }

    // --- Status ---

    /// Asks the bot whether the account is linked, trying each status command
    /// until one gets a recognized answer.
    pub async fn check_status(&self, platform: Platform, user_id: &str) -> StatusReport {
        let Some(profile) = self.profiles.get(platform) else {
            return self.report(
                platform,
                user_id,
                LinkState::Error,
                None,
                format!("{platform} is not a bridged platform"),
            );
        };

        let mut dialogue = match self.open_dialogue(profile).await {
            Ok(dialogue) => dialogue,
            Err(e) => {
                return self.report(platform, user_id, LinkState::Error, None, e.to_string());
            }
        };

        for command in profile.status_commands {
            if let Err(e) = self.say(&mut dialogue, command).await {
                return self.report(platform, user_id, LinkState::Error, None, e.to_string());
            }
            let answer = self
                .poll(&dialogue, self.status_wait(), |reply| {
                    let state = match profile.grammar.classify(&reply.body)? {
                        Marker::Error => LinkState::BridgeError,
                        Marker::StatusDisconnected => LinkState::Disconnected,
                        Marker::AlreadyConnected | Marker::Success | Marker::StatusConnected => {
                            LinkState::Connected
                        }
                        _ => return None,
                    };
                    Some((state, reply.body.clone()))
                })
                .await;

            match answer {
                Ok((state, raw)) => {
                    if matches!(state, LinkState::Connected | LinkState::Disconnected) {
                        self.record_status(platform, user_id, state == LinkState::Connected);
                    }
                    let message = match state {
                        LinkState::Connected => format!("{} is connected", platform.label()),
                        LinkState::Disconnected => format!("{} is not connected", platform.label()),
                        _ => format!("{} bridge reported an error", platform.label()),
                    };
                    return self.report(platform, user_id, state, Some(raw), message);
                }
                Err(UnichatError::BridgeTimeout { .. }) => {
                    debug!(%platform, command, "no status answer, trying next command");
                }
                Err(e) => {
                    return self.report(platform, user_id, LinkState::Error, None, e.to_string());
                }
            }
        }

        self.report(
            platform,
            user_id,
            LinkState::Timeout,
            None,
            format!("{} bridge did not answer any status command", platform.label()),
        )
    }

    /// Checks every bridged platform concurrently.
    pub async fn check_all(&self, user_id: &str) -> Vec<StatusReport> {
        join_all(
            Platform::BRIDGED
                .iter()
                .map(|platform| self.check_status(*platform, user_id)),
        )
        .await
    }

    /// Last observed status without contacting the bot.
    pub fn cached_status(&self, platform: Platform, user_id: Option<&str>) -> PlatformStatus {
        self.statuses.get(platform, user_id)
    }

    /// Sends the logout command and marks the platform disconnected whether
    /// or not the bot could be reached.
    pub async fn disconnect(&self, platform: Platform, user_id: &str) -> DisconnectResult {
        let Some(profile) = self.profiles.get(platform) else {
            return DisconnectResult {
                success: false,
                platform,
                message: format!("{platform} is not a bridged platform"),
            };
        };

        let delivered = match self.open_dialogue(profile).await {
            Ok(mut dialogue) => self.say(&mut dialogue, profile.logout_command).await,
            Err(e) => Err(e),
        };
        self.record_status(platform, user_id, false);

        let message = match delivered {
            Ok(()) => format!("{} disconnected", platform.label()),
            Err(e) => {
                warn!(%platform, user_id, error = %e, "logout command not delivered");
                format!(
                    "{} marked disconnected; the bridge could not be reached",
                    platform.label()
                )
            }
        };
        info!(%platform, user_id, "bridge disconnected");
        DisconnectResult {
            success: true,
            platform,
            message,
        }
    }

    // --- Helpers ---

    fn record_status(&self, platform: Platform, user_id: &str, connected: bool) {
        let status = self.statuses.set(platform, Some(user_id), connected);
        self.sink.emit_to_user(
            user_id,
            RealtimeEvent::PlatformStatus(PlatformStatusChanged {
                platform,
                connected: status.connected,
                last_updated: status.last_updated,
                user_id: Some(user_id.to_string()),
            }),
        );
    }

    fn report(
        &self,
        platform: Platform,
        user_id: &str,
        status: LinkState,
        raw: Option<String>,
        message: String,
    ) -> StatusReport {
        let cached = self.statuses.get(platform, Some(user_id));
        StatusReport {
            success: matches!(status, LinkState::Connected | LinkState::Disconnected),
            platform,
            status,
            connected: cached.connected,
            last_updated: cached.last_updated,
            account: raw.as_deref().and_then(grammar::extract_account),
            raw,
            message,
        }
    }

    async fn open_dialogue<'a>(
        &self,
        profile: &'a BridgeProfile,
    ) -> Result<Dialogue<'a>, UnichatError> {
        let room_id = self
            .client
            .ensure_direct_room(&profile.bot_id, &profile.room_name(), &profile.room_topic())
            .await?;
        Ok(Dialogue {
            profile,
            room_id,
            anchor: String::new(),
        })
    }

    async fn say(&self, dialogue: &mut Dialogue<'_>, text: &str) -> Result<(), UnichatError> {
        dialogue.anchor = self.client.send_text(&dialogue.room_id, text).await?;
        debug!(
            platform = %dialogue.profile.platform,
            room_id = %dialogue.room_id,
            anchor = %dialogue.anchor,
            "sent bridge command"
        );
        Ok(())
    }

    fn login_wait(&self, stage: &'static str) -> Wait {
        Wait {
            attempts: self.polling.attempts,
            interval: self.polling.interval,
            stage,
        }
    }

    fn code_wait(&self, stage: &'static str) -> Wait {
        Wait {
            attempts: self.polling.code_attempts,
            interval: self.polling.interval,
            stage,
        }
    }

    fn status_wait(&self) -> Wait {
        Wait {
            attempts: self.polling.status_attempts,
            interval: self.polling.status_interval,
            stage: "status reply",
        }
    }

    /// Reads the bot's replies after the anchor, newest first, until `decide`
    /// accepts one or the attempts run out.
    ///
    /// Transient read failures are retried on the next tick; forbidden or
    /// missing rooms and expired credentials end the wait.
    async fn poll<T>(
        &self,
        dialogue: &Dialogue<'_>,
        wait: Wait,
        mut decide: impl FnMut(&BotReply) -> Option<T>,
    ) -> Result<T, UnichatError> {
        let platform = dialogue.profile.platform;
        let resolver = self.client.media_resolver();
        let mut checked: HashMap<String, bool> = HashMap::new();

        for attempt in 1..=wait.attempts {
            tokio::time::sleep(wait.interval).await;
            let events = match self.read_replies(dialogue).await {
                Ok(events) => events,
                Err(e) if e.is_terminal() || matches!(e, UnichatError::CredentialExpired) => {
                    return Err(e);
                }
                Err(e) => {
                    warn!(%platform, attempt, error = %e, "bridge transcript read failed");
                    continue;
                }
            };
            debug!(%platform, attempt, replies = events.len(), stage = wait.stage, "polled bridge room");

            for event in &events {
                let reply = self.to_reply(event, &resolver, &mut checked).await;
                if let Some(found) = decide(&reply) {
                    return Ok(found);
                }
            }
        }

        Err(UnichatError::BridgeTimeout {
            platform,
            stage: wait.stage.to_string(),
        })
    }

    async fn read_replies(&self, dialogue: &Dialogue<'_>) -> Result<Vec<RoomEvent>, UnichatError> {
        let page = self
            .client
            .messages(&dialogue.room_id, self.polling.history_limit, None)
            .await?;
        Ok(page
            .chunk
            .into_iter()
            .take_while(|event| event.event_id.as_deref() != Some(dialogue.anchor.as_str()))
            .filter(|event| {
                event.kind == "m.room.message"
                    && event.sender.as_deref() == Some(dialogue.profile.bot_id.as_str())
            })
            .collect())
    }

    async fn to_reply(
        &self,
        event: &RoomEvent,
        resolver: &MediaResolver,
        checked: &mut HashMap<String, bool>,
    ) -> BotReply {
        let body = event.body().unwrap_or_default().to_string();
        let locator = match event.msgtype() {
            Some("m.image") => event.str_field("url"),
            _ => None,
        };
        let Some(locator) = locator else {
            return BotReply { body, image: None };
        };

        let url = resolver.download_url(locator);
        let fetchable = match checked.get(&url) {
            Some(fetchable) => *fetchable,
            None => {
                let fetchable = self.client.check_media(&url).await;
                checked.insert(url.clone(), fetchable);
                fetchable
            }
        };
        BotReply {
            body,
            image: Some(ImageReply { url, fetchable }),
        }
    }
}

/// Intermediate dialogue position.
#[derive(Debug)]
enum Step {
    Phone,
    /// A code is pending; `Some` when the bot issued it.
    Code(Option<String>),
    Connected(Option<String>),
}

fn bridge_error(platform: Platform, body: &str) -> UnichatError {
    UnichatError::Bridge {
        platform,
        message: body.trim().to_string(),
    }
}

/// Strips formatting from a phone number and requires international form.
pub fn normalize_phone(raw: &str) -> Result<String, UnichatError> {
    let mut digits = String::new();
    for (index, c) in raw.trim().chars().enumerate() {
        match c {
            '0'..='9' => digits.push(c),
            '+' if index == 0 => {}
            ' ' | '-' | '(' | ')' | '.' => {}
            _ => {
                return Err(UnichatError::InvalidInput(format!(
                    "invalid phone number `{raw}`"
                )));
            }
        }
    }
    if !(7..=15).contains(&digits.len()) {
        return Err(UnichatError::InvalidInput(format!(
            "phone number `{raw}` must have 7 to 15 digits"
        )));
    }
    Ok(format!("+{digits}"))
}

/// Serializes the cookie jar the bot expects, sorted by name.
fn cookie_payload(
    jar: &HashMap<String, String>,
    required: &[&str],
    required_only: bool,
) -> Result<String, UnichatError> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|name| jar.get(*name).is_none_or(|value| value.is_empty()))
        .collect();
    if !missing.is_empty() {
        return Err(UnichatError::InvalidInput(format!(
            "missing required cookies: {}",
            missing.join(", ")
        )));
    }

    let selected: BTreeMap<&str, &str> = jar
        .iter()
        .filter(|(name, _)| !required_only || required.contains(&name.as_str()))
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();
    serde_json::to_string(&selected)
        .map_err(|e| UnichatError::Internal(format!("cookie serialization failed: {e}")))
}
