// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process state of bridge linking: verification sessions awaiting a code,
//! and the last observed link status per platform.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use unichat_core::{Platform, PlatformStatus, SessionId};

/// A login that is waiting for the user to submit a verification code.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationSession {
    pub id: SessionId,
    pub user_id: String,
    pub platform: Platform,
    pub room_id: String,
    pub phone_number: Option<String>,
    /// Last event the gateway sent into the bot room; replies are read after it.
    pub anchor_event_id: String,
    pub created_at: DateTime<Utc>,
}

/// Verification sessions keyed by id, expiring after a fixed TTL.
///
/// At most one session exists per `(user, platform)`: creating a new one
/// supersedes the old.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<SessionId, VerificationSession>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    pub fn create(
        &self,
        user_id: &str,
        platform: Platform,
        room_id: &str,
        phone_number: Option<String>,
        anchor_event_id: &str,
    ) -> SessionId {
        self.sessions
            .retain(|_, s| !(s.user_id == user_id && s.platform == platform));

        let id = SessionId::generate();
        self.sessions.insert(
            id.clone(),
            VerificationSession {
                id: id.clone(),
                user_id: user_id.to_string(),
                platform,
                room_id: room_id.to_string(),
                phone_number,
                anchor_event_id: anchor_event_id.to_string(),
                created_at: Utc::now(),
            },
        );
        debug!(session_id = %id, user_id, %platform, "verification session created");
        id
    }

    /// Live session by id. Expired sessions are removed and reported absent.
    pub fn get(&self, id: &SessionId) -> Option<VerificationSession> {
        let session = self.sessions.get(id)?.clone();
        if self.is_expired(&session) {
            self.sessions.remove(id);
            return None;
        }
        Some(session)
    }

    pub fn set_anchor(&self, id: &SessionId, anchor_event_id: &str) {
        if let Some(mut session) = self.sessions.get_mut(id) {
            session.anchor_event_id = anchor_event_id.to_string();
        }
    }

    pub fn remove(&self, id: &SessionId) -> Option<VerificationSession> {
        self.sessions.remove(id).map(|(_, s)| s)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drops expired sessions and returns how many were removed.
    pub fn sweep(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !self.is_expired(s));
        before.saturating_sub(self.sessions.len())
    }

    /// Sweeps every `interval` until `cancel` fires.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = self.sweep();
                        if removed > 0 {
                            info!(removed, "expired verification sessions removed");
                        }
                    }
                }
            }
        })
    }

    fn is_expired(&self, session: &VerificationSession) -> bool {
        let age = Utc::now().signed_duration_since(session.created_at);
        age.to_std().map(|age| age >= self.ttl).unwrap_or(false)
    }
}

/// Last observed link status per platform, optionally scoped to a user.
///
/// Writes are last-write-wins; unknown entries read as disconnected.
#[derive(Debug, Default)]
pub struct PlatformStatusStore {
    statuses: DashMap<(Platform, Option<String>), PlatformStatus>,
}

impl PlatformStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, platform: Platform, user_id: Option<&str>, connected: bool) -> PlatformStatus {
        let status = PlatformStatus {
            connected,
            last_updated: Some(Utc::now()),
        };
        self.statuses
            .insert((platform, user_id.map(str::to_string)), status);
        status
    }

    /// User-scoped status, falling back to the gateway-wide entry.
    pub fn get(&self, platform: Platform, user_id: Option<&str>) -> PlatformStatus {
        if let Some(user) = user_id
            && let Some(status) = self.statuses.get(&(platform, Some(user.to_string())))
        {
            return *status;
        }
        self.statuses
            .get(&(platform, None))
            .map(|s| *s)
            .unwrap_or_default()
    }

    /// Status of every bridged platform for a user.
    pub fn snapshot(&self, user_id: Option<&str>) -> Vec<(Platform, PlatformStatus)> {
        Platform::BRIDGED
            .iter()
            .map(|platform| (*platform, self.get(*platform, user_id)))
            .collect()
    }
}
