// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sync loops and messaging services for the Unichat gateway.
//!
//! - [`SyncEngine`]: one cancellable long-poll loop per connected user.
//! - [`MessagingService`]: room listing, history, sending, and room management.
//! - [`Summarizer`]: room summaries with platform classification.

pub mod engine;
pub mod messaging;
pub mod reactions;
pub mod summary;
pub mod timeline;

pub use engine::{CycleOutcome, SyncEngine, SyncSettings};
pub use messaging::{MessagingService, OutgoingMessage};
pub use summary::Summarizer;
