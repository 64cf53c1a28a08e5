// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Unichat gateway.

use std::time::Duration;

use thiserror::Error;

use crate::types::Platform;

/// The primary error type shared by the protocol client, bridge engine, and sync engine.
#[derive(Debug, Error)]
pub enum UnichatError {
    /// Configuration errors (invalid TOML, bad header values, missing credentials).
    #[error("configuration error: {0}")]
    Config(String),

    /// Non-2xx response from the chat server.
    #[error("protocol error ({status}): {message}")]
    Protocol {
        status: u16,
        /// Server-reported `errcode`, e.g. `M_FORBIDDEN`.
        errcode: Option<String>,
        message: String,
    },

    /// The server rejected the bearer credential and no refresh was possible.
    #[error("credential expired")]
    CredentialExpired,

    /// Connection-level failure before a response arrived.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// A bounded poll of a bridge bot's room ran out without a recognized reply.
    #[error("{platform} bridge did not answer while waiting for {stage}")]
    BridgeTimeout { platform: Platform, stage: String },

    /// A bridge bot answered with an error marker.
    #[error("{platform} bridge reported an error: {message}")]
    Bridge { platform: Platform, message: String },

    /// Every configured upload provider failed for a file.
    #[error("media upload failed: {message}")]
    MediaUploadFailed { message: String },

    /// Unknown or expired verification session.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The operation needs a capability this deployment does not have.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Caller-supplied input was rejected before any network call.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl UnichatError {
    /// HTTP status associated with the error, when it came from the server.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Protocol { status, .. } => Some(*status),
            Self::CredentialExpired => Some(401),
            _ => None,
        }
    }

    /// Client-side timeouts and server 408s. The sync loop reuses its cursor on these.
    pub fn is_timeout_class(&self) -> bool {
        matches!(self, Self::Timeout { .. }) || self.status() == Some(408)
    }

    /// 403 and 404 are final for the call that produced them.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status(), Some(403 | 404))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protocol(status: u16) -> UnichatError {
        UnichatError::Protocol {
            status,
            errcode: None,
            message: "x".into(),
        }
    }

    #[test]
    fn timeout_class_covers_client_timeouts_and_408() {
        assert!(UnichatError::Timeout {
            duration: Duration::from_secs(65)
        }
        .is_timeout_class());
        assert!(protocol(408).is_timeout_class());
        assert!(!protocol(500).is_timeout_class());
        assert!(!UnichatError::Internal("boom".into()).is_timeout_class());
    }

    #[test]
    fn forbidden_and_not_found_are_terminal() {
        assert!(protocol(403).is_terminal());
        assert!(protocol(404).is_terminal());
        assert!(!protocol(429).is_terminal());
        assert!(!UnichatError::CredentialExpired.is_terminal());
    }

    #[test]
    fn credential_expired_reports_401() {
        assert_eq!(UnichatError::CredentialExpired.status(), Some(401));
    }

    #[test]
    fn bridge_errors_name_the_platform() {
        let err = UnichatError::BridgeTimeout {
            platform: Platform::Telegram,
            stage: "verification code".into(),
        };
        assert_eq!(
            err.to_string(),
            "telegram bridge did not answer while waiting for verification code"
        );
    }
}
