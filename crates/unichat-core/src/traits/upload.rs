// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media upload providers.

use async_trait::async_trait;

use crate::error::UnichatError;
use crate::types::Attachment;

/// Stores a file and returns a locator that can be placed in a message's `url` field.
#[async_trait]
pub trait MediaUploader: Send + Sync + 'static {
    /// Provider name used in logs.
    fn name(&self) -> &str;

    async fn upload(&self, attachment: &Attachment) -> Result<String, UnichatError>;
}
