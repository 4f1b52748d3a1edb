//! Image decoding and grayscale conversion.
//!
//! Decoding happens outside the core pipeline: callers holding encoded
//! bytes (files, uploads) go through [`decode`], callers that already
//! hold pixels hand a [`DynamicImage`] straight to the preprocessor.

use image::{DynamicImage, GrayImage};

use crate::types::PipelineError;

/// Decode raw image bytes (PNG, JPEG, BMP, WebP).
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    Ok(image::load_from_memory(bytes)?)
}

/// Convert any decoded image to 8-bit grayscale.
///
/// Color inputs use the standard luminance weights
/// (`0.299*R + 0.587*G + 0.114*B`); grayscale inputs are copied.
#[must_use = "returns the grayscale image"]
pub fn to_gray(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        other => other.to_luma8(),
    }
}
