//! Normalization to the canonical working resolution.
//!
//! Every input, whatever its size, is resized so its longer side equals
//! `normalization_size` (aspect ratio preserved). Gallery photos run the
//! [`enhance`](crate::enhance) chain first; already-enhanced captures are
//! only converted to grayscale.
//!
//! Preprocessing never fails: when enhancement errors, the original is
//! resized as-is and the failure is recorded as a [`Degradation`].

use std::fmt;

use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};

use crate::types::{CaptureSource, Degradation, Dimensions, ExtractorConfig, Stage};

/// Resampling filter used when normalizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResampleFilter {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, decent quality.
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    CatmullRom,
    /// Lanczos with 3 lobes: slowest, sharpest.
    Lanczos3,
}

impl ResampleFilter {
    /// Convert to the `image` crate's `FilterType`.
    const fn to_image_filter(self) -> image::imageops::FilterType {
        match self {
            Self::Nearest => image::imageops::FilterType::Nearest,
            Self::Triangle => image::imageops::FilterType::Triangle,
            Self::CatmullRom => image::imageops::FilterType::CatmullRom,
            Self::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for ResampleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("Nearest"),
            Self::Triangle => f.write_str("Triangle"),
            Self::CatmullRom => f.write_str("CatmullRom"),
            Self::Lanczos3 => f.write_str("Lanczos3"),
        }
    }
}

/// Output of the preprocessor.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// Normalized grayscale image.
    pub image: GrayImage,
    /// Dimensions of the input before normalization.
    pub source_dimensions: Dimensions,
    /// Whether the enhancement chain ran successfully.
    pub enhanced: bool,
    /// Set when enhancement failed and the plain resize was used.
    pub degradation: Option<Degradation>,
}

/// Dimensions after scaling `source` so its longer side is `target`.
///
/// Aspect ratio is preserved and the shorter side is at least 1 pixel.
/// Zero-sized inputs or a zero target yield zero dimensions.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn normalized_dimensions(source: Dimensions, target: u32) -> Dimensions {
    if source.is_empty() || target == 0 {
        return Dimensions::default();
    }
    let scale = f64::from(target) / f64::from(source.longer_side());
    let scaled = |side: u32| ((f64::from(side) * scale).round() as u32).clamp(1, target);
    Dimensions::new(scaled(source.width), scaled(source.height))
}

/// Resize a grayscale image so its longer side equals `target`.
///
/// Images already at the target size are returned unchanged.
#[must_use = "returns the resized image"]
pub fn resize_to(image: &GrayImage, target: u32, filter: ResampleFilter) -> GrayImage {
    let source = Dimensions::new(image.width(), image.height());
    let dims = normalized_dimensions(source, target);
    if dims.is_empty() {
        return GrayImage::new(0, 0);
    }
    if dims == source {
        return image.clone();
    }
    image::imageops::resize(image, dims.width, dims.height, filter.to_image_filter())
}

/// Normalize an input image for feature extraction.
///
/// `Gallery` sources are enhanced (CLAHE, bilateral smoothing, unsharp
/// mask) before resizing; `Capture` sources are only converted to
/// grayscale. If enhancement fails the original is resized without it.
#[must_use = "returns the normalized image"]
pub fn preprocess(
    image: &DynamicImage,
    source: CaptureSource,
    config: &ExtractorConfig,
) -> Preprocessed {
    let gray = crate::grayscale::to_gray(image);
    let source_dimensions = Dimensions::new(gray.width(), gray.height());

    let (base, enhanced, degradation) = if source.needs_enhancement() {
        match crate::enhance::enhance(&gray, &config.enhance) {
            Ok(enhanced) => (enhanced, true, None),
            Err(e) => {
                tracing::warn!(error = %e, "enhancement failed, falling back to plain resize");
                let degradation = Degradation {
                    stage: Stage::Preprocess,
                    reason: e.to_string(),
                };
                (gray, false, Some(degradation))
            }
        }
    } else {
        (gray, false, None)
    };

    let normalized = resize_to(&base, config.normalization_size, config.resample_filter);
    tracing::debug!(
        source = %source_dimensions,
        width = normalized.width(),
        height = normalized.height(),
        enhanced,
        "preprocessed image",
    );

    Preprocessed {
        image: normalized,
        source_dimensions,
        enhanced,
        degradation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EnhanceConfig;

    fn gray_image(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(w, h, |x, y| {
            image::Luma([if (x + y) % 7 < 3 { 60 } else { 190 }])
        }))
    }

    #[test]
    fn default_filter_is_triangle() {
        assert_eq!(ResampleFilter::default(), ResampleFilter::Triangle);
    }

    #[test]
    fn normalized_dimensions_landscape() {
        let dims = normalized_dimensions(Dimensions::new(1000, 750), 500);
        assert_eq!(dims, Dimensions::new(500, 375));
    }

    #[test]
    fn normalized_dimensions_portrait_upscales() {
        let dims = normalized_dimensions(Dimensions::new(100, 200), 500);
        assert_eq!(dims, Dimensions::new(250, 500));
    }

    #[test]
    fn normalized_dimensions_keeps_thin_side() {
        let dims = normalized_dimensions(Dimensions::new(5000, 2), 500);
        assert_eq!(dims, Dimensions::new(500, 1));
    }

    #[test]
    fn normalized_dimensions_empty() {
        assert!(normalized_dimensions(Dimensions::new(0, 10), 500).is_empty());
        assert!(normalized_dimensions(Dimensions::new(10, 10), 0).is_empty());
    }

    #[test]
    fn capture_is_resized_without_enhancement() {
        let out = preprocess(&gray_image(800, 600), CaptureSource::Capture, &ExtractorConfig::default());
        assert_eq!((out.image.width(), out.image.height()), (500, 375));
        assert!(!out.enhanced);
        assert!(out.degradation.is_none());
        assert_eq!(out.source_dimensions, Dimensions::new(800, 600));
    }

    #[test]
    fn gallery_is_enhanced() {
        let out = preprocess(&gray_image(120, 90), CaptureSource::Gallery, &ExtractorConfig::default());
        assert!(out.enhanced);
        assert!(out.degradation.is_none());
        assert_eq!((out.image.width(), out.image.height()), (500, 375));
    }

    #[test]
    fn failed_enhancement_falls_back_to_plain_resize() {
        let config = ExtractorConfig {
            enhance: EnhanceConfig {
                clahe_tiles: 0,
                ..EnhanceConfig::default()
            },
            ..ExtractorConfig::default()
        };
        let input = gray_image(100, 100);
        let out = preprocess(&input, CaptureSource::Gallery, &config);
        assert!(!out.enhanced);
        let degradation = out.degradation.as_ref().map(|d| d.stage);
        assert_eq!(degradation, Some(Stage::Preprocess));

        let plain = preprocess(&input, CaptureSource::Capture, &config);
        assert_eq!(out.image, plain.image);
    }

    #[test]
    fn oversized_bilateral_radius_falls_back() {
        let config = ExtractorConfig {
            enhance: EnhanceConfig {
                bilateral_radius: 1 << 31,
                ..EnhanceConfig::default()
            },
            ..ExtractorConfig::default()
        };
        let input = gray_image(80, 60);
        let out = preprocess(&input, CaptureSource::Gallery, &config);
        assert!(!out.enhanced);
        let reason = out.degradation.as_ref().map(|d| (d.stage, d.reason.as_str()));
        assert!(matches!(
            reason,
            Some((Stage::Preprocess, r)) if r.contains("bilateral_radius")
        ));
        assert_eq!(out.image, preprocess(&input, CaptureSource::Capture, &config).image);
    }

    #[test]
    fn empty_input_degrades_to_empty_output() {
        let out = preprocess(
            &DynamicImage::ImageLuma8(GrayImage::new(0, 0)),
            CaptureSource::Gallery,
            &ExtractorConfig::default(),
        );
        assert_eq!(out.image.width(), 0);
        assert!(out.degradation.is_some());
    }

    #[test]
    fn color_input_is_converted_to_gray() {
        let rgb = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            50,
            50,
            image::Rgb([200, 10, 10]),
        ));
        let out = preprocess(&rgb, CaptureSource::Capture, &ExtractorConfig::default());
        assert_eq!(out.image.width(), 500);
    }

    #[test]
    fn resize_at_target_is_identity() {
        let img = GrayImage::from_pixel(500, 200, image::Luma([42]));
        assert_eq!(resize_to(&img, 500, ResampleFilter::Triangle), img);
    }
}
