// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Unichat gateway.
//!
//! This crate provides the error taxonomy, the domain types exchanged between
//! the protocol client, bridge engine, sync engine and realtime dispatcher,
//! and the capability traits those components are wired through.

pub mod error;
pub mod traits;
pub mod types;

pub use error::UnichatError;
pub use types::{
    Attachment, HealthStatus, Platform, PlatformStatus, RealtimeEvent, RoomKind, RoomSummary,
    SessionId,
};

pub use traits::{CookieSource, EventSink, MediaUploader, ServiceAdapter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_traits_are_exported() {
        fn _assert_service<T: ServiceAdapter>() {}
        fn _assert_sink<T: EventSink>() {}
        fn _assert_cookies<T: CookieSource>() {}
        fn _assert_uploader<T: MediaUploader>() {}
    }

    #[test]
    fn traits_are_object_safe() {
        fn _sink(_: &dyn EventSink) {}
        fn _cookies(_: &dyn CookieSource) {}
        fn _uploader(_: &dyn MediaUploader) {}
    }
}
