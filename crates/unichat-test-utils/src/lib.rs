// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Unichat integration tests.
//!
//! # Components
//!
//! - [`RecordingSink`] - Event sink that captures every realtime event
//! - [`MockHomeserver`] - wiremock-backed homeserver with canned endpoints
//! - [`MockUploader`] - Media uploader with a fixed outcome
//! - [`ScriptedBot`] - Bridge bot answering commands from a script

pub mod homeserver;
pub mod mock_uploader;
pub mod recording_sink;
pub mod scripted_bot;

pub use homeserver::{MockHomeserver, TEST_TOKEN, TEST_USER, image_event, text_event};
pub use mock_uploader::MockUploader;
pub use recording_sink::{Recorded, RecordingSink};
pub use scripted_bot::ScriptedBot;
