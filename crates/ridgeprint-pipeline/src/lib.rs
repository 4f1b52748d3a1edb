//! ridgeprint-pipeline: Pure fingerprint feature pipeline (sans-IO).
//!
//! Turns a fingerprint image into a set of minutiae through:
//! normalize (+ enhance for gallery photos) -> Otsu binarize ->
//! Zhang-Suen skeletonize -> crossing-number detection.
//!
//! Feature sets are compared with a tolerant, translation-invariant
//! matcher built on local neighborhood descriptors.
//!
//! This crate has **no I/O dependencies**: it operates on in-memory
//! images or byte slices and returns structured data. File handling and
//! the subscriber for its `tracing` output live in `ridgeprint-cli`.

pub mod binarize;
pub mod descriptor;
pub mod diagnostics;
pub mod enhance;
pub mod grayscale;
pub mod matcher;
pub mod minutiae;
pub mod pipeline;
pub mod preprocess;
pub mod skeleton;
pub mod types;

pub use diagnostics::{Clock, ExtractionDiagnostics, SystemClock, extract_with_diagnostics};
pub use matcher::{
    GalleryHit, ScoreTier, SimilarityBreakdown, compute_similarity, match_features, rank_gallery,
    score_features,
};
pub use pipeline::{Pipeline, PipelineStage, StagedExtraction};
pub use types::{
    CaptureSource, Degradation, Dimensions, DynamicImage, EnhanceConfig, ExtractorConfig,
    FeatureSet, GrayImage, MatchResult, MatcherConfig, Minutia, MinutiaKind, PipelineError,
    RidgePolarity, Stage,
};

/// Extract the feature set of one image.
///
/// Never fails: stages that hit trouble fall back and the result may be
/// empty. Use [`extract_staged`] to see the recorded degradations.
#[must_use = "returns the extracted feature set"]
pub fn extract(image: DynamicImage, source: CaptureSource, config: ExtractorConfig) -> FeatureSet {
    extract_staged(image, source, config).features
}

/// Extract the feature set and keep every intermediate.
#[must_use = "returns the staged extraction"]
pub fn extract_staged(
    image: DynamicImage,
    source: CaptureSource,
    config: ExtractorConfig,
) -> StagedExtraction {
    Pipeline::new(image, source, config)
        .preprocess()
        .binarize()
        .skeletonize()
        .detect_minutiae()
        .into_result()
}

/// Decode encoded image bytes (PNG, JPEG, BMP, WebP) and extract.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty and
/// [`PipelineError::ImageDecode`] if the format is unrecognized.
pub fn extract_from_bytes(
    bytes: &[u8],
    source: CaptureSource,
    config: ExtractorConfig,
) -> Result<FeatureSet, PipelineError> {
    let image = grayscale::decode(bytes)?;
    Ok(extract(image, source, config))
}

/// Compare a probe feature set against a reference.
///
/// Same as [`match_features`]; the comparison is directional.
#[must_use = "returns the match result"]
pub fn compare(probe: &FeatureSet, reference: &FeatureSet, config: &MatcherConfig) -> MatchResult {
    match_features(probe, reference, config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Diagonal dark ridges, 10 px period, with a light border.
    fn diagonal_ridges(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let inside = x > 15 && y > 15 && x < width - 15 && y < height - 15;
            let ridge = inside && (x + y) % 10 < 4;
            image::Luma([if ridge { 35 } else { 210 }])
        })
    }

    fn png_bytes(image: &GrayImage) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::L8,
        )
        .unwrap();
        buf
    }

    #[test]
    fn extract_from_bytes_empty_input() {
        let result = extract_from_bytes(&[], CaptureSource::Capture, ExtractorConfig::default());
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn extract_from_bytes_invalid_image() {
        let result = extract_from_bytes(
            &[0xde, 0xad, 0xbe, 0xef],
            CaptureSource::Capture,
            ExtractorConfig::default(),
        );
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn extract_from_bytes_matches_in_memory_extraction() {
        let gray = diagonal_ridges(160, 160);
        let from_bytes =
            extract_from_bytes(&png_bytes(&gray), CaptureSource::Capture, ExtractorConfig::default())
                .unwrap();
        let direct = extract(
            DynamicImage::ImageLuma8(gray),
            CaptureSource::Capture,
            ExtractorConfig::default(),
        );
        assert_eq!(from_bytes, direct);
    }

    #[test]
    fn extract_staged_reports_source_dimensions() {
        let staged = extract_staged(
            DynamicImage::ImageLuma8(diagonal_ridges(200, 100)),
            CaptureSource::Capture,
            ExtractorConfig::default(),
        );
        assert_eq!(staged.source_dimensions, Dimensions::new(200, 100));
        assert_eq!(staged.features.dimensions, Dimensions::new(500, 250));
        assert!(!staged.enhanced);
    }

    #[test]
    fn extraction_is_deterministic() {
        let run = || {
            extract(
                DynamicImage::ImageLuma8(diagonal_ridges(180, 140)),
                CaptureSource::Gallery,
                ExtractorConfig::default(),
            )
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn empty_image_extracts_nothing() {
        let features = extract(
            DynamicImage::new_luma8(0, 0),
            CaptureSource::Gallery,
            ExtractorConfig::default(),
        );
        assert!(features.is_empty());
    }

    #[test]
    fn compare_is_match_features() {
        let features = extract(
            DynamicImage::ImageLuma8(diagonal_ridges(160, 160)),
            CaptureSource::Capture,
            ExtractorConfig::default(),
        );
        let config = MatcherConfig::default();
        assert_eq!(
            compare(&features, &features, &config),
            match_features(&features, &features, &config)
        );
    }
}
