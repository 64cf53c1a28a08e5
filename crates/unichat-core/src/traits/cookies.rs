// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Browser-driven cookie acquisition for cookie-authenticated bridges.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::UnichatError;

/// Obtains a logged-in session's cookies from an external browser automation host.
#[async_trait]
pub trait CookieSource: Send + Sync + 'static {
    /// Open `login_url`, wait until the page URL or content matches one of
    /// `success_hints`, then return the cookie jar as name/value pairs.
    async fn acquire_session_cookies(
        &self,
        login_url: &str,
        success_hints: &[&str],
    ) -> Result<HashMap<String, String>, UnichatError>;
}
