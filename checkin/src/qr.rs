//! QR codec for check-in codes.
//!
//! A check-in code carries the plain text `"<eventId>:<userId>"`. Encoding
//! renders that text at error-correction level High with a one-module margin.
//! Decoding a bitmap is left to whatever scanner produced the text; this
//! module only validates and splits it.
//!
//! There is no escaping rule for the delimiter, so identifiers that are empty
//! or contain `:` are rejected when a payload is built.

use crate::types::{EventId, UserId};
use image::{DynamicImage, GrayImage, ImageFormat, Luma, imageops::FilterType};
use qrcode::{Color, EcLevel, QrCode};
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;
use thiserror::Error;

/// Separates the event id from the user id.
pub const DELIMITER: char = ':';

/// Quiet zone around the symbol, in modules.
pub const MARGIN: usize = 1;

/// Default rendered image size in pixels.
pub const DEFAULT_PIXEL_SIZE: u32 = 200;

/// QR encoding and decoding failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QrError {
    /// Text is not exactly two non-empty `:`-separated segments.
    #[error("invalid QR code format")]
    InvalidFormat,

    /// An identifier would not survive a round trip.
    #[error("{field} must be non-empty and must not contain ':'")]
    InvalidIdentifier {
        /// Which identifier was rejected
        field: &'static str,
    },

    /// The symbol could not be built or rendered.
    #[error("failed to render QR code: {0}")]
    Render(String),
}

/// Whether `text` splits on `:` into exactly two non-empty segments.
#[must_use]
pub fn is_valid_format(text: &str) -> bool {
    split(text).is_some()
}

/// Event id segment of a well-formed code.
#[must_use]
pub fn extract_event_id(text: &str) -> Option<&str> {
    split(text).map(|(event_id, _)| event_id)
}

/// User id segment of a well-formed code.
#[must_use]
pub fn extract_user_id(text: &str) -> Option<&str> {
    split(text).map(|(_, user_id)| user_id)
}

fn split(text: &str) -> Option<(&str, &str)> {
    let mut segments = text.split(DELIMITER);
    match (segments.next(), segments.next(), segments.next()) {
        (Some(event_id), Some(user_id), None) if !event_id.is_empty() && !user_id.is_empty() => {
            Some((event_id, user_id))
        },
        _ => None,
    }
}

fn validate_identifier(field: &'static str, id: &str) -> Result<(), QrError> {
    if id.is_empty() || id.contains(DELIMITER) {
        return Err(QrError::InvalidIdentifier { field });
    }
    Ok(())
}

/// The decoded content of a check-in code.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QrPayload {
    event_id: EventId,
    user_id: UserId,
}

impl QrPayload {
    /// Build a payload, rejecting identifiers that would not round-trip.
    ///
    /// # Errors
    ///
    /// Returns [`QrError::InvalidIdentifier`] if either id is empty or contains `:`.
    pub fn new(event_id: EventId, user_id: UserId) -> Result<Self, QrError> {
        validate_identifier("eventId", event_id.as_str())?;
        validate_identifier("userId", user_id.as_str())?;
        Ok(Self { event_id, user_id })
    }

    /// Parse scanned text.
    ///
    /// # Errors
    ///
    /// Returns [`QrError::InvalidFormat`] unless the text is exactly two
    /// non-empty `:`-separated segments.
    pub fn decode(text: &str) -> Result<Self, QrError> {
        let (event_id, user_id) = split(text).ok_or(QrError::InvalidFormat)?;
        Ok(Self {
            event_id: EventId::new(event_id),
            user_id: UserId::new(user_id),
        })
    }

    /// Event named by the code
    #[must_use]
    pub const fn event_id(&self) -> &EventId {
        &self.event_id
    }

    /// User named by the code
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Text carried by the symbol
    #[must_use]
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for QrPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{DELIMITER}{}", self.event_id, self.user_id)
    }
}

impl FromStr for QrPayload {
    type Err = QrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

/// Dark/light modules of a symbol including its margin.
struct ModuleGrid {
    width: usize,
    dark: Vec<bool>,
}

impl ModuleGrid {
    fn build(payload: &QrPayload) -> Result<Self, QrError> {
        let code = QrCode::with_error_correction_level(payload.to_text().as_bytes(), EcLevel::H)
            .map_err(|e| QrError::Render(e.to_string()))?;

        let inner = code.width();
        let width = inner + 2 * MARGIN;
        let mut dark = vec![false; width * width];
        for (index, color) in code.to_colors().into_iter().enumerate() {
            let (row, col) = (index / inner, index % inner);
            dark[(row + MARGIN) * width + col + MARGIN] = color == Color::Dark;
        }
        Ok(Self { width, dark })
    }

    fn is_dark(&self, row: usize, col: usize) -> bool {
        row < self.width && col < self.width && self.dark[row * self.width + col]
    }
}

/// Renders check-in codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QrCodec {
    pixel_size: u32,
}

impl Default for QrCodec {
    fn default() -> Self {
        Self::new(DEFAULT_PIXEL_SIZE)
    }
}

impl QrCodec {
    /// Codec that renders square images `pixel_size` pixels wide.
    #[must_use]
    pub const fn new(pixel_size: u32) -> Self {
        Self { pixel_size }
    }

    /// Rendered image width and height
    #[must_use]
    pub const fn pixel_size(&self) -> u32 {
        self.pixel_size
    }

    /// Build the payload for `(event_id, user_id)` and render it as a bitmap.
    ///
    /// # Errors
    ///
    /// [`QrError::InvalidIdentifier`] for ids that would not round-trip, or
    /// [`QrError::Render`] if the symbol can't be built.
    pub fn encode(&self, event_id: &EventId, user_id: &UserId) -> Result<GrayImage, QrError> {
        let payload = QrPayload::new(event_id.clone(), user_id.clone())?;
        self.render_image(&payload)
    }

    /// Render a payload as a grayscale bitmap scaled to the configured size.
    ///
    /// # Errors
    ///
    /// Returns [`QrError::Render`] if the symbol can't be built.
    pub fn render_image(&self, payload: &QrPayload) -> Result<GrayImage, QrError> {
        let grid = ModuleGrid::build(payload)?;
        let side = u32::try_from(grid.width).map_err(|e| QrError::Render(e.to_string()))?;
        let modules = GrayImage::from_fn(side, side, |x, y| {
            if grid.is_dark(y as usize, x as usize) {
                Luma([0])
            } else {
                Luma([255])
            }
        });

        let size = self.pixel_size.max(side);
        Ok(image::imageops::resize(&modules, size, size, FilterType::Nearest))
    }

    /// Render a payload as PNG bytes.
    ///
    /// # Errors
    ///
    /// Returns [`QrError::Render`] if the symbol can't be built or encoded.
    pub fn render_png(&self, payload: &QrPayload) -> Result<Vec<u8>, QrError> {
        let image = self.render_image(payload)?;
        let mut buffer = Vec::new();
        DynamicImage::ImageLuma8(image)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| QrError::Render(e.to_string()))?;
        Ok(buffer)
    }

    /// Render a payload as a standalone SVG document.
    ///
    /// # Errors
    ///
    /// Returns [`QrError::Render`] if the symbol can't be built.
    pub fn render_svg(&self, payload: &QrPayload) -> Result<String, QrError> {
        use std::fmt::Write as _;

        let grid = ModuleGrid::build(payload)?;
        let mut svg = format!(
            r##"<?xml version="1.0" standalone="yes"?><svg xmlns="http://www.w3.org/2000/svg" version="1.1" width="{size}" height="{size}" viewBox="0 0 {w} {w}" shape-rendering="crispEdges"><rect width="{w}" height="{w}" fill="#fff"/><path fill="#000" d=""##,
            size = self.pixel_size,
            w = grid.width,
        );
        for row in 0..grid.width {
            for col in 0..grid.width {
                if grid.is_dark(row, col) {
                    let _ = write!(svg, "M{col} {row}h1v1h-1z");
                }
            }
        }
        svg.push_str(r#""/></svg>"#);
        Ok(svg)
    }

    /// Render a payload for a terminal, two rows of modules per line.
    ///
    /// # Errors
    ///
    /// Returns [`QrError::Render`] if the symbol can't be built.
    pub fn render_text(&self, payload: &QrPayload) -> Result<String, QrError> {
        let grid = ModuleGrid::build(payload)?;
        let mut text = String::with_capacity(grid.width * (grid.width / 2 + 1) * 3);
        for row in (0..grid.width).step_by(2) {
            for col in 0..grid.width {
                text.push(match (grid.is_dark(row, col), grid.is_dark(row + 1, col)) {
                    (true, true) => '█',
                    (true, false) => '▀',
                    (false, true) => '▄',
                    (false, false) => ' ',
                });
            }
            text.push('\n');
        }
        Ok(text)
    }
}
