// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat protocol plumbing for the Unichat gateway.
//!
//! - [`MatrixClient`]: authenticated client-server API calls with bounded
//!   timeouts and single-flight credential refresh.
//! - [`MediaResolver`]: `mxc://` locator to download/thumbnail URL mapping.
//! - [`FallbackUploader`]: ordered media upload providers.

pub mod client;
pub mod credential;
pub mod media;
pub mod types;
pub mod upload;

pub use client::{MatrixClient, Timeouts};
pub use media::{MediaResolver, ThumbnailMethod};
pub use upload::{FallbackUploader, MatrixUploader};
