// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability traits shared across the Unichat crates.
//!
//! Async traits use `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod cookies;
pub mod sink;
pub mod upload;

pub use adapter::ServiceAdapter;
pub use cookies::CookieSource;
pub use sink::EventSink;
pub use upload::MediaUploader;
