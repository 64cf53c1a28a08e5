// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local QR rendering for bots that send login data as text.

use std::fmt::Write;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use qrcode::{Color, EcLevel, QrCode};
use unichat_core::UnichatError;

/// Blank modules around the code, per the QR quiet-zone rule.
const QUIET_ZONE: usize = 4;
/// Rendered edge length in pixels.
const IMAGE_SIZE: usize = 300;

/// Renders `payload` as an SVG QR image and returns it as a `data:` URL.
pub fn render_data_url(payload: &str) -> Result<String, UnichatError> {
    let svg = render_svg(payload)?;
    Ok(format!(
        "data:image/svg+xml;base64,{}",
        STANDARD.encode(svg.as_bytes())
    ))
}

fn render_svg(payload: &str) -> Result<String, UnichatError> {
    let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::H)
        .map_err(|e| UnichatError::Internal(format!("QR encoding failed: {e}")))?;
    let width = code.width();
    let colors = code.into_colors();
    let size = width + 2 * QUIET_ZONE;

    let mut path = String::new();
    for (index, color) in colors.iter().enumerate() {
        if *color == Color::Dark {
            let x = index % width + QUIET_ZONE;
            let y = index / width + QUIET_ZONE;
            let _ = write!(path, "M{x} {y}h1v1h-1z");
        }
    }

    Ok(format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{px}" height="{px}" "#,
            r#"viewBox="0 0 {size} {size}" shape-rendering="crispEdges">"#,
            r##"<rect width="{size}" height="{size}" fill="#ffffff"/>"##,
            r##"<path d="{path}" fill="#000000"/></svg>"##
        ),
        px = IMAGE_SIZE,
        size = size,
        path = path,
    ))
}
