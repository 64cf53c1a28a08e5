// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media upload through the homeserver's repository with ordered fallbacks.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;
use unichat_core::{Attachment, MediaUploader, UnichatError};

use crate::client::MatrixClient;

/// Uploads into the homeserver media repository.
pub struct MatrixUploader {
    client: MatrixClient,
}

impl MatrixUploader {
    pub fn new(client: MatrixClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MediaUploader for MatrixUploader {
    fn name(&self) -> &str {
        "matrix-media"
    }

    async fn upload(&self, attachment: &Attachment) -> Result<String, UnichatError> {
        self.client.upload(attachment).await
    }
}

/// Tries each provider in order and returns the first locator obtained.
pub struct FallbackUploader {
    providers: Vec<Arc<dyn MediaUploader>>,
}

impl FallbackUploader {
    pub fn new(primary: Arc<dyn MediaUploader>) -> Self {
        Self {
            providers: vec![primary],
        }
    }

    /// Appends a provider tried after every earlier one failed.
    pub fn with_fallback(mut self, provider: Arc<dyn MediaUploader>) -> Self {
        self.providers.push(provider);
        self
    }
}

#[async_trait]
impl MediaUploader for FallbackUploader {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn upload(&self, attachment: &Attachment) -> Result<String, UnichatError> {
        let mut failures = Vec::new();
        for provider in &self.providers {
            match provider.upload(attachment).await {
                Ok(locator) => return Ok(locator),
                Err(e) => {
                    warn!(
                        provider = provider.name(),
                        file = %attachment.file_name,
                        error = %e,
                        "media upload failed"
                    );
                    failures.push(format!("{}: {e}", provider.name()));
                }
            }
        }
        Err(UnichatError::MediaUploadFailed {
            message: format!("{} ({})", attachment.file_name, failures.join("; ")),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Fixed {
        name: &'static str,
        result: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(name: &'static str, result: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                name,
                result,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl MediaUploader for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn upload(&self, _attachment: &Attachment) -> Result<String, UnichatError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .map(str::to_string)
                .ok_or_else(|| UnichatError::Internal(format!("{} down", self.name)))
        }
    }

    fn file() -> Attachment {
        Attachment {
            file_name: "a.txt".into(),
            content_type: "text/plain".into(),
            data: b"hi".to_vec(),
        }
    }

    #[tokio::test]
    async fn primary_success_skips_fallback() {
        let primary = Fixed::new("primary", Some("mxc://hs/a"));
        let fallback = Fixed::new("cdn", Some("https://cdn/a"));
        let uploader = FallbackUploader::new(primary.clone()).with_fallback(fallback.clone());
        assert_eq!(uploader.upload(&file()).await.unwrap(), "mxc://hs/a");
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn falls_back_after_primary_failure() {
        let uploader = FallbackUploader::new(Fixed::new("primary", None))
            .with_fallback(Fixed::new("cdn", Some("https://cdn/a")));
        assert_eq!(uploader.upload(&file()).await.unwrap(), "https://cdn/a");
    }

    #[tokio::test]
    async fn all_failures_surface_as_media_upload_failed() {
        let uploader = FallbackUploader::new(Fixed::new("primary", None))
            .with_fallback(Fixed::new("cdn", None));
        let err = uploader.upload(&file()).await.unwrap_err();
        match err {
            UnichatError::MediaUploadFailed { message } => {
                assert!(message.contains("primary down"));
                assert!(message.contains("cdn down"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
