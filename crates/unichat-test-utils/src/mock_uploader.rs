// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media uploader with a pre-configured outcome.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use unichat_core::{Attachment, MediaUploader, UnichatError};

/// Returns a fixed locator, or always fails, and counts calls.
#[derive(Debug, Clone)]
pub struct MockUploader {
    name: String,
    locator: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl MockUploader {
    /// Uploader that answers every upload with `locator`.
    pub fn succeeding(name: &str, locator: &str) -> Self {
        Self {
            name: name.to_string(),
            locator: Some(locator.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Uploader whose every upload fails.
    pub fn failing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            locator: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaUploader for MockUploader {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upload(&self, attachment: &Attachment) -> Result<String, UnichatError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.locator
            .clone()
            .ok_or_else(|| UnichatError::MediaUploadFailed {
                message: format!("{} rejected {}", self.name, attachment.file_name),
            })
    }
}
