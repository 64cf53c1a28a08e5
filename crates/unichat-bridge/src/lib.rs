// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bridge linking for the Unichat gateway.
//!
//! Each bridged platform is reached through a bot on the chat server. This
//! crate holds the bots' reply grammar, the per-platform dialogue engine,
//! the room classifier, and the in-memory session and status stores.

pub mod classifier;
pub mod engine;
pub mod grammar;
pub mod profile;
pub mod qr;
pub mod store;

pub use classifier::Classifier;
pub use engine::{
    BridgeEngine, DisconnectResult, FailureReason, LinkState, LoginMethod, LoginOptions,
    LoginOutcome, LoginResult, Polling, QrSource, StatusReport, VerificationResult,
};
pub use grammar::Marker;
pub use profile::{BridgeProfile, BridgeProfiles, LoginStyle};
pub use store::{PlatformStatusStore, SessionStore, VerificationSession};
