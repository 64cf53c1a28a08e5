// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The shared bearer credential and its single-flight refresh guard.

use std::sync::RwLock;

use tokio::sync::{Mutex, MutexGuard};

/// Access token shared read-mostly by every protocol call.
pub struct Credential {
    token: RwLock<String>,
    refresh: Mutex<()>,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(token.into()),
            refresh: Mutex::new(()),
        }
    }

    /// Snapshot of the current token.
    pub fn current(&self) -> String {
        match self.token.read() {
            Ok(token) => token.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn replace(&self, token: String) {
        match self.token.write() {
            Ok(mut current) => *current = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    /// Serializes refresh attempts. Holders must re-check [`Self::is_stale`]
    /// after acquiring, since another task may have refreshed meanwhile.
    pub async fn lock_refresh(&self) -> MutexGuard<'_, ()> {
        self.refresh.lock().await
    }

    /// True while the current token is still the one that was rejected.
    pub fn is_stale(&self, rejected: &str) -> bool {
        self.current() == rejected
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[redacted]")
            .finish()
    }
}
