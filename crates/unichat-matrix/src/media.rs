// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resolution of `mxc://server/id` media locators to fetchable URLs.
//!
//! Anything that is not a well-formed locator is returned unchanged, so
//! callers can pass through URLs that were already resolved.

use std::fmt;

const LOCATOR_SCHEME: &str = "mxc://";

/// Thumbnail resize method accepted by the media repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThumbnailMethod {
    #[default]
    Scale,
    Crop,
}

impl fmt::Display for ThumbnailMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Scale => "scale",
            Self::Crop => "crop",
        })
    }
}

/// Default thumbnail box.
pub const DEFAULT_THUMBNAIL: (u32, u32) = (800, 600);

/// Thumbnail box used for message previews.
pub const PREVIEW_THUMBNAIL: (u32, u32) = (400, 300);

/// Renders download and thumbnail URLs against one homeserver origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaResolver {
    origin: String,
}

impl MediaResolver {
    pub fn new(homeserver_url: &str) -> Self {
        Self {
            origin: homeserver_url.trim_end_matches('/').to_string(),
        }
    }

    /// `mxc://server/id` to `{origin}/_matrix/media/v3/download/server/id`.
    pub fn download_url(&self, locator: &str) -> String {
        match parse_locator(locator) {
            Some((server, media_id)) => {
                format!("{}/_matrix/media/v3/download/{server}/{media_id}", self.origin)
            }
            None => locator.to_string(),
        }
    }

    /// Thumbnail URL with explicit dimensions and method.
    pub fn thumbnail_url(
        &self,
        locator: &str,
        width: u32,
        height: u32,
        method: ThumbnailMethod,
    ) -> String {
        match parse_locator(locator) {
            Some((server, media_id)) => format!(
                "{}/_matrix/media/v3/thumbnail/{server}/{media_id}?width={width}&height={height}&method={method}",
                self.origin
            ),
            None => locator.to_string(),
        }
    }

    /// Thumbnail URL with the default 800x600 scale box.
    pub fn default_thumbnail_url(&self, locator: &str) -> String {
        let (width, height) = DEFAULT_THUMBNAIL;
        self.thumbnail_url(locator, width, height, ThumbnailMethod::Scale)
    }

    /// Resolve an optional locator, keeping `None` as `None`.
    pub fn resolve_opt(&self, locator: Option<&str>) -> Option<String> {
        locator.map(|l| self.download_url(l))
    }
}

/// Split a locator into `(server, media_id)`; `None` unless both are present.
pub fn parse_locator(locator: &str) -> Option<(&str, &str)> {
    let rest = locator.strip_prefix(LOCATOR_SCHEME)?;
    let mut parts = rest.split('/');
    let server = parts.next()?;
    let media_id = parts.next()?;
    if parts.next().is_some() || server.is_empty() || media_id.is_empty() {
        return None;
    }
    Some((server, media_id))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn resolver() -> MediaResolver {
        MediaResolver::new("https://hs.example")
    }

    #[test]
    fn resolves_download_url() {
        assert_eq!(
            resolver().download_url("mxc://example.org/abc123"),
            "https://hs.example/_matrix/media/v3/download/example.org/abc123"
        );
    }

    #[test]
    fn trailing_slash_on_origin_is_ignored() {
        let resolver = MediaResolver::new("https://hs.example/");
        assert_eq!(
            resolver.download_url("mxc://a/b"),
            "https://hs.example/_matrix/media/v3/download/a/b"
        );
    }

    #[test]
    fn resolves_thumbnail_url() {
        assert_eq!(
            resolver().thumbnail_url("mxc://example.org/abc", 400, 300, ThumbnailMethod::Crop),
            "https://hs.example/_matrix/media/v3/thumbnail/example.org/abc?width=400&height=300&method=crop"
        );
        assert!(
            resolver()
                .default_thumbnail_url("mxc://example.org/abc")
                .ends_with("?width=800&height=600&method=scale")
        );
    }

    #[test]
    fn malformed_locators_pass_through() {
        for input in [
            "",
            "mxc://",
            "mxc://server",
            "mxc://server/",
            "mxc:///id",
            "mxc://a/b/c",
            "https://cdn.example/x.png",
        ] {
            assert_eq!(resolver().download_url(input), input);
            assert_eq!(resolver().default_thumbnail_url(input), input);
        }
    }

    #[test]
    fn optional_locator() {
        assert_eq!(resolver().resolve_opt(None), None);
        assert_eq!(
            resolver().resolve_opt(Some("mxc://a/b")).as_deref(),
            Some("https://hs.example/_matrix/media/v3/download/a/b")
        );
    }

    proptest! {
        #[test]
        fn valid_locators_keep_server_and_id(
            server in "[a-z0-9.]{1,20}",
            media_id in "[A-Za-z0-9_-]{1,32}",
        ) {
            let locator = format!("mxc://{server}/{media_id}");
            let download = resolver().download_url(&locator);
            let thumb = resolver().default_thumbnail_url(&locator);
            prop_assert!(download.contains(&server) && download.contains(&media_id));
            prop_assert!(thumb.contains(&server) && thumb.contains(&media_id));
            prop_assert_ne!(download, locator);
        }

        #[test]
        fn non_locators_are_unchanged(input in "[^m].*") {
            prop_assert_eq!(resolver().download_url(&input), input.clone());
            prop_assert_eq!(
                resolver().thumbnail_url(&input, 10, 10, ThumbnailMethod::Scale),
                input
            );
        }
    }
}
