//! AVIF derivative encoder.
//!
//! This module handles decoding source images from the mirror and encoding
//! derivatives as AVIF.
//!
//! # Design Decisions
//!
//! - **Format guessed from content**: source files are decoded by sniffing
//!   their magic bytes, so a mislabelled extension still decodes.
//!
//! - **No upscaling**: [`fit_inside`] never returns dimensions larger than the
//!   source. Tiers the source already fits in are not resized at all.
//!
//! - **8-bit output**: images are normalized to RGB8 or RGBA8 before encoding,
//!   keeping alpha only when the source has it.

use bytes::Bytes;
use image::codecs::avif::AvifEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageReader};
use std::io::Cursor;

use crate::error::ConversionError;

/// Default AVIF quality (1-100).
pub const DEFAULT_AVIF_QUALITY: u8 = 80;

/// Minimum allowed AVIF quality.
pub const MIN_AVIF_QUALITY: u8 = 1;

/// Maximum allowed AVIF quality.
pub const MAX_AVIF_QUALITY: u8 = 100;

/// Default AVIF encoder speed (1 = slowest/smallest, 10 = fastest).
pub const DEFAULT_AVIF_SPEED: u8 = 6;

/// Minimum allowed AVIF encoder speed.
pub const MIN_AVIF_SPEED: u8 = 1;

/// Maximum allowed AVIF encoder speed.
pub const MAX_AVIF_SPEED: u8 = 10;

/// MIME type of every encoded derivative.
pub const DERIVATIVE_CONTENT_TYPE: &str = "image/avif";

// =============================================================================
// AVIF Encoder
// =============================================================================

/// Decodes source images and encodes AVIF derivatives.
///
/// Cheap to clone; every worker task carries its own copy.
///
/// # Example
///
/// ```ignore
/// use image_ladder::derive::DerivativeEncoder;
///
/// let encoder = DerivativeEncoder::new(80, 6);
/// let image = encoder.decode(&png_bytes)?;
/// let avif = encoder.encode(&image)?;
/// ```
#[derive(Debug, Clone, Copy)]
pub struct DerivativeEncoder {
    quality: u8,
    speed: u8,
}

impl DerivativeEncoder {
    /// Create an encoder with the given quality and speed.
    ///
    /// Out-of-range values are clamped.
    pub fn new(quality: u8, speed: u8) -> Self {
        Self {
            quality: clamp_quality(quality),
            speed: speed.clamp(MIN_AVIF_SPEED, MAX_AVIF_SPEED),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn speed(&self) -> u8 {
        self.speed
    }

    /// Decode a source image, guessing its format from the content.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::DecodeError`] if the format cannot be
    /// recognized or the data is corrupt.
    pub fn decode(&self, source: &[u8]) -> Result<DynamicImage, ConversionError> {
        let reader = ImageReader::new(Cursor::new(source))
            .with_guessed_format()
            .map_err(|e| ConversionError::DecodeError {
                message: e.to_string(),
            })?;

        if reader.format().is_none() {
            return Err(ConversionError::DecodeError {
                message: "unrecognized image format".to_string(),
            });
        }

        reader.decode().map_err(|e| ConversionError::DecodeError {
            message: e.to_string(),
        })
    }

    /// Encode an image as AVIF.
    pub fn encode(&self, image: &DynamicImage) -> Result<Bytes, ConversionError> {
        let normalized = if image.color().has_alpha() {
            DynamicImage::ImageRgba8(image.to_rgba8())
        } else {
            DynamicImage::ImageRgb8(image.to_rgb8())
        };

        let mut output = Vec::new();
        let encoder = AvifEncoder::new_with_speed_quality(&mut output, self.speed, self.quality);

        normalized
            .write_with_encoder(encoder)
            .map_err(|e| ConversionError::EncodeError {
                message: e.to_string(),
            })?;

        Ok(Bytes::from(output))
    }

    /// Downscale an image so its longer edge fits within `edge`, then encode it.
    pub fn encode_tier(&self, image: &DynamicImage, edge: u32) -> Result<Bytes, ConversionError> {
        let (width, height) = image.dimensions();
        let (target_width, target_height) = fit_inside(width, height, edge);

        if (target_width, target_height) == (width, height) {
            return self.encode(image);
        }

        let resized = image.resize_exact(target_width, target_height, FilterType::Lanczos3);
        self.encode(&resized)
    }
}

impl Default for DerivativeEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_AVIF_QUALITY, DEFAULT_AVIF_SPEED)
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Dimensions of `width x height` scaled to fit inside an `edge x edge` square.
///
/// Aspect ratio is preserved and the result is never larger than the input.
/// Neither side rounds below 1 pixel.
pub fn fit_inside(width: u32, height: u32, edge: u32) -> (u32, u32) {
    if width <= edge && height <= edge {
        return (width, height);
    }

    let (long, short) = if width >= height {
        (width, height)
    } else {
        (height, width)
    };

    let scaled_short = (short as u64 * edge as u64 + long as u64 / 2) / long as u64;
    let scaled_short = (scaled_short as u32).max(1);

    if width >= height {
        (edge, scaled_short)
    } else {
        (scaled_short, edge)
    }
}

/// Validate AVIF quality parameter.
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_AVIF_QUALITY..=MAX_AVIF_QUALITY).contains(&quality)
}

/// Validate AVIF encoder speed parameter.
#[inline]
pub fn is_valid_speed(speed: u8) -> bool {
    (MIN_AVIF_SPEED..=MAX_AVIF_SPEED).contains(&speed)
}

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_AVIF_QUALITY, MAX_AVIF_QUALITY)
}

/// Whether `data` starts with an ISO-BMFF `ftyp` box carrying an AVIF brand.
pub fn is_avif(data: &[u8]) -> bool {
    if data.len() < 12 || &data[4..8] != b"ftyp" {
        return false;
    }

    matches!(&data[8..12], b"avif" | b"avis")
}

// =============================================================================
// Tests
// =============================================================================
