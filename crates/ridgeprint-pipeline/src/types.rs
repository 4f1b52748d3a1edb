//! Shared types for the ridgeprint feature pipeline and matcher.

use std::f64::consts::{FRAC_PI_2, PI};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::preprocess::ResampleFilter;

/// Re-export `GrayImage` so downstream crates can reference
/// intermediate raster data without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `DynamicImage`, the input type accepted by the pipeline.
pub use image::DynamicImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create dimensions from width and height.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// The longer of the two sides.
    #[must_use]
    pub const fn longer_side(self) -> u32 {
        if self.width >= self.height {
            self.width
        } else {
            self.height
        }
    }

    /// Total number of pixels.
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Returns `true` if either side is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Where an input image came from, which decides whether the
/// preprocessor runs its enhancement chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CaptureSource {
    /// Unenhanced photo (e.g. picked from a gallery). Enhanced before
    /// normalization.
    Gallery,
    /// Capture that was already enhanced upstream. Only converted to
    /// grayscale and resized.
    #[default]
    Capture,
}

impl CaptureSource {
    /// Map the boolean `from_gallery` flag used by capture front-ends.
    #[must_use]
    pub const fn from_gallery_flag(from_gallery: bool) -> Self {
        if from_gallery {
            Self::Gallery
        } else {
            Self::Capture
        }
    }

    /// Whether the enhancement chain applies to this source.
    #[must_use]
    pub const fn needs_enhancement(self) -> bool {
        matches!(self, Self::Gallery)
    }
}

/// Boolean ridge mask. `true` pixels are ridge (foreground).
///
/// The buffer is row-major and always holds exactly `width * height`
/// entries; [`from_raw`](Self::from_raw) rejects anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RidgeMask {
    width: u32,
    height: u32,
    pixels: Vec<bool>,
}

impl RidgeMask {
    /// An all-background mask.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            pixels: vec![false; len],
        }
    }

    /// Wrap an existing row-major buffer. Returns `None` when the length
    /// does not match the dimensions.
    #[must_use]
    pub fn from_raw(width: u32, height: u32, pixels: Vec<bool>) -> Option<Self> {
        (pixels.len() == width as usize * height as usize).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    /// Build a mask from a grayscale image: pixels `>= 128` are ridge.
    #[must_use]
    pub fn from_gray(image: &GrayImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            pixels: image.as_raw().iter().map(|&v| v >= 128).collect(),
        }
    }

    /// Render the mask as a grayscale image (ridge = 255).
    #[must_use]
    pub fn to_gray(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            image::Luma([if self.get(x, y) { 255 } else { 0 }])
        })
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Width and height.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// Ridge state of `(x, y)`. Out-of-bounds reads are background.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.pixels[self.index(x, y)]
    }

    /// Ridge state at signed coordinates; anything outside is background.
    #[must_use]
    pub fn get_signed(&self, x: i64, y: i64) -> bool {
        match (u32::try_from(x), u32::try_from(y)) {
            (Ok(x), Ok(y)) => self.get(x, y),
            _ => false,
        }
    }

    /// Set the ridge state of `(x, y)`. Out-of-bounds writes are ignored.
    pub fn set(&mut self, x: u32, y: u32, ridge: bool) {
        if x < self.width && y < self.height {
            let i = self.index(x, y);
            self.pixels[i] = ridge;
        }
    }

    /// Number of ridge pixels.
    #[must_use]
    pub fn ridge_count(&self) -> u64 {
        self.pixels.iter().map(|&p| u64::from(p)).sum()
    }

    /// Row-major view of the mask.
    #[must_use]
    pub fn as_slice(&self) -> &[bool] {
        &self.pixels
    }

    const fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

/// The two minutia classes detected on a ridge skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MinutiaKind {
    /// A ridge that terminates.
    RidgeEnding,
    /// A ridge that splits in two.
    Bifurcation,
}

impl fmt::Display for MinutiaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RidgeEnding => f.pad("ending"),
            Self::Bifurcation => f.pad("bifurcation"),
        }
    }
}

/// A single ridge feature.
///
/// Coordinates are integer pixels in the normalized image the feature
/// set was extracted from. `angle` is ridge-symmetric: it lives in
/// `[0, pi)` because a ridge direction and its reverse are the same.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Minutia {
    /// Horizontal position (pixels from left edge).
    pub x: u32,
    /// Vertical position (pixels from top edge).
    pub y: u32,
    /// Ending or bifurcation.
    pub kind: MinutiaKind,
    /// Orientation in radians, `[0, pi)`.
    ///
    /// Descriptors difference raw angles, so a value outside `[0, pi)`
    /// skews every relative angle it takes part in. Construct through
    /// [`Minutia::new`], or pass replacement angles through
    /// [`normalize_ridge_angle`] when updating fields directly.
    pub angle: f64,
}

impl Minutia {
    /// Create a minutia, folding `angle` into `[0, pi)`.
    #[must_use]
    pub fn new(x: u32, y: u32, kind: MinutiaKind, angle: f64) -> Self {
        Self {
            x,
            y,
            kind,
            angle: normalize_ridge_angle(angle),
        }
    }

    /// Squared Euclidean distance to another minutia.
    #[must_use]
    pub fn distance_squared(&self, other: &Self) -> f64 {
        let dx = f64::from(self.x) - f64::from(other.x);
        let dy = f64::from(self.y) - f64::from(other.y);
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another minutia.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Position as an `[x, y]` pair for spatial indexing.
    #[must_use]
    pub fn position(&self) -> [f64; 2] {
        [f64::from(self.x), f64::from(self.y)]
    }
}

/// Fold an angle into `[0, pi)`.
#[must_use]
pub fn normalize_ridge_angle(angle: f64) -> f64 {
    if !angle.is_finite() {
        return 0.0;
    }
    let folded = angle.rem_euclid(PI);
    // rem_euclid can round up to exactly pi for tiny negative inputs.
    if folded >= PI { 0.0 } else { folded }
}

/// Fold an angle difference into `[-pi, pi)`.
#[must_use]
pub fn normalize_signed_angle(angle: f64) -> f64 {
    if !angle.is_finite() {
        return 0.0;
    }
    let shifted = (angle + PI).rem_euclid(2.0 * PI);
    let wrapped = shifted - PI;
    if wrapped >= PI { -PI } else { wrapped }
}

/// Distance between two ridge angles, taking the mod-pi wrap into
/// account. Always in `[0, pi/2]`.
#[must_use]
pub fn ridge_angle_difference(a: f64, b: f64) -> f64 {
    let diff = normalize_ridge_angle(a - b);
    diff.min(PI - diff).clamp(0.0, FRAC_PI_2)
}

/// The minutiae extracted from one image.
///
/// Produced exactly once per image and never mutated by the matcher.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureSet {
    /// Minutiae in discovery order.
    pub minutiae: Vec<Minutia>,
    /// Dimensions of the normalized image the coordinates refer to.
    pub dimensions: Dimensions,
}

impl FeatureSet {
    /// Create a feature set.
    #[must_use]
    pub const fn new(minutiae: Vec<Minutia>, dimensions: Dimensions) -> Self {
        Self {
            minutiae,
            dimensions,
        }
    }

    /// Number of minutiae.
    #[must_use]
    pub fn len(&self) -> usize {
        self.minutiae.len()
    }

    /// Returns `true` if there are no minutiae.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.minutiae.is_empty()
    }

    /// Number of minutiae of the given kind.
    #[must_use]
    pub fn count_kind(&self, kind: MinutiaKind) -> usize {
        self.minutiae.iter().filter(|m| m.kind == kind).count()
    }
}

impl FromIterator<Minutia> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = Minutia>>(iter: I) -> Self {
        let minutiae: Vec<Minutia> = iter.into_iter().collect();
        Self {
            minutiae,
            dimensions: Dimensions::default(),
        }
    }
}

/// Outcome of comparing two feature sets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Similarity in `[0, 1]`.
    pub similarity: f64,
    /// `similarity >= decision_threshold`.
    pub is_match: bool,
    /// Equal to `similarity`.
    pub confidence: f64,
}

impl MatchResult {
    /// Apply the decision rule to a similarity score.
    #[must_use]
    pub fn from_similarity(similarity: f64, decision_threshold: f64) -> Self {
        let similarity = similarity.clamp(0.0, 1.0);
        Self {
            similarity,
            is_match: similarity >= decision_threshold,
            confidence: similarity,
        }
    }
}

/// Which intensity class holds the ridges after thresholding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RidgePolarity {
    /// Ridges are darker than valleys (ink, contact sensors).
    #[default]
    Dark,
    /// Ridges are brighter than valleys.
    Light,
    /// Whichever class covers fewer pixels is taken as ridge.
    Auto,
}

/// Parameters for the gallery enhancement chain
/// (CLAHE -> bilateral smoothing -> unsharp mask).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhanceConfig {
    /// CLAHE tiles along each axis.
    pub clahe_tiles: u32,
    /// CLAHE clip limit as a multiple of the mean histogram bin height.
    pub clahe_clip_limit: f32,
    /// Bilateral filter window radius in pixels, at most
    /// [`Self::MAX_BILATERAL_RADIUS`].
    pub bilateral_radius: u32,
    /// Bilateral range sigma (intensity units).
    pub bilateral_range_sigma: f32,
    /// Bilateral spatial sigma in pixels.
    pub bilateral_spatial_sigma: f32,
    /// Gaussian sigma of the unsharp mask.
    pub unsharp_sigma: f32,
    /// Unsharp amount: `out = orig + amount * (orig - blurred)`.
    pub unsharp_amount: f32,
}

impl EnhanceConfig {
    /// Default CLAHE tile grid size per axis.
    pub const DEFAULT_CLAHE_TILES: u32 = 8;
    /// Default CLAHE clip limit.
    pub const DEFAULT_CLAHE_CLIP_LIMIT: f32 = 2.0;
    /// Default bilateral window radius.
    pub const DEFAULT_BILATERAL_RADIUS: u32 = 4;
    /// Largest accepted bilateral window radius.
    pub const MAX_BILATERAL_RADIUS: u32 = 32;
    /// Default bilateral range sigma.
    pub const DEFAULT_BILATERAL_RANGE_SIGMA: f32 = 50.0;
    /// Default bilateral spatial sigma.
    pub const DEFAULT_BILATERAL_SPATIAL_SIGMA: f32 = 3.0;
    /// Default unsharp blur sigma.
    pub const DEFAULT_UNSHARP_SIGMA: f32 = 2.0;
    /// Default unsharp amount.
    pub const DEFAULT_UNSHARP_AMOUNT: f32 = 0.5;
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            clahe_tiles: Self::DEFAULT_CLAHE_TILES,
            clahe_clip_limit: Self::DEFAULT_CLAHE_CLIP_LIMIT,
            bilateral_radius: Self::DEFAULT_BILATERAL_RADIUS,
            bilateral_range_sigma: Self::DEFAULT_BILATERAL_RANGE_SIGMA,
            bilateral_spatial_sigma: Self::DEFAULT_BILATERAL_SPATIAL_SIGMA,
            unsharp_sigma: Self::DEFAULT_UNSHARP_SIGMA,
            unsharp_amount: Self::DEFAULT_UNSHARP_AMOUNT,
        }
    }
}

/// Configuration for feature extraction (preprocess through minutiae).
///
/// All parameters have defaults matching the calibrated pipeline.
/// Deserialization fills missing fields from [`Default`], so partial
/// JSON configs are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Larger side of the normalized image, in pixels.
    pub normalization_size: u32,
    /// Resampling filter used for normalization.
    pub resample_filter: ResampleFilter,
    /// Gallery enhancement parameters.
    pub enhance: EnhanceConfig,
    /// Which threshold class holds the ridges.
    pub polarity: RidgePolarity,
    /// Larger side of the mask the skeletonizer works on.
    pub skeleton_working_size: u32,
    /// Maximum number of thinning iterations.
    pub max_thinning_iterations: u32,
    /// Stop thinning once a sub-iteration deletes fewer pixels than
    /// `max(early_termination_floor, early_termination_fraction * pixels)`.
    pub early_termination: bool,
    /// Fraction of the pixel count used by early termination.
    pub early_termination_fraction: f64,
    /// Minimum deletion count used by early termination.
    pub early_termination_floor: u64,
    /// Pixels near the image border that are never reported as minutiae.
    pub border_margin: u32,
    /// Accepted minutiae are further apart than this (pixels).
    pub min_separation: f64,
}

impl ExtractorConfig {
    /// Default normalization size.
    pub const DEFAULT_NORMALIZATION_SIZE: u32 = 500;
    /// Default skeletonization working size.
    pub const DEFAULT_SKELETON_WORKING_SIZE: u32 = 300;
    /// Default thinning iteration cap.
    pub const DEFAULT_MAX_THINNING_ITERATIONS: u32 = 25;
    /// Default early-termination fraction (0.2% of pixels).
    pub const DEFAULT_EARLY_TERMINATION_FRACTION: f64 = 0.002;
    /// Default early-termination floor.
    pub const DEFAULT_EARLY_TERMINATION_FLOOR: u64 = 5;
    /// Default border margin.
    pub const DEFAULT_BORDER_MARGIN: u32 = 5;
    /// Default minimum minutia separation.
    pub const DEFAULT_MIN_SEPARATION: f64 = 10.0;

    /// Deletion count below which early termination stops thinning.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn early_termination_threshold(&self, pixel_count: u64) -> u64 {
        let fraction = (pixel_count as f64 * self.early_termination_fraction.max(0.0)) as u64;
        fraction.max(self.early_termination_floor)
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            normalization_size: Self::DEFAULT_NORMALIZATION_SIZE,
            resample_filter: ResampleFilter::default(),
            enhance: EnhanceConfig::default(),
            polarity: RidgePolarity::default(),
            skeleton_working_size: Self::DEFAULT_SKELETON_WORKING_SIZE,
            max_thinning_iterations: Self::DEFAULT_MAX_THINNING_ITERATIONS,
            early_termination: true,
            early_termination_fraction: Self::DEFAULT_EARLY_TERMINATION_FRACTION,
            early_termination_floor: Self::DEFAULT_EARLY_TERMINATION_FLOOR,
            border_margin: Self::DEFAULT_BORDER_MARGIN,
            min_separation: Self::DEFAULT_MIN_SEPARATION,
        }
    }
}

/// Every constant of the descriptor matcher and its scoring heuristic.
///
/// The tier breakpoints and multipliers are empirical calibration, kept
/// here so they can be retuned without touching the matching logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Neighbors further away than this are not part of a descriptor.
    pub descriptor_radius: f64,
    /// Maximum neighbors per descriptor.
    pub max_neighbors: usize,
    /// A descriptor pair is accepted when its score exceeds this.
    pub acceptance_threshold: f64,
    /// Accepted pairs scoring above this count as high quality.
    pub high_quality_threshold: f64,
    /// Feature sets smaller than this score 0.
    pub min_minutiae: usize,
    /// `min/max` count ratios below this skip descriptor matching.
    pub count_ratio_floor: f64,
    /// Similarity returned when the count ratio is below the floor.
    pub count_mismatch_similarity: f64,
    /// `similarity >= decision_threshold` is a match.
    pub decision_threshold: f64,
    /// Angle difference at which angle similarity reaches 0.
    pub angle_tolerance: f64,
    /// Neighbor distance tolerance (pixels, exclusive).
    pub neighbor_distance_tolerance: f64,
    /// Neighbor relative-angle tolerance (radians, exclusive).
    pub neighbor_angle_tolerance: f64,
    /// Weight of angle similarity in the descriptor score.
    pub angle_weight: f64,
    /// Weight of neighbor similarity in the descriptor score.
    pub neighbor_weight: f64,
    /// Both sub-scores must exceed this to avoid the penalty.
    pub sub_score_floor: f64,
    /// Multiplier applied when a sub-score is at or below the floor.
    pub weak_score_penalty: f64,
    /// Neighbor similarity when both descriptors have no neighbors.
    pub empty_neighbors_similarity: f64,
    /// Neighbor similarity when exactly one descriptor has no neighbors.
    pub one_sided_neighbors_similarity: f64,
    /// Match ratios below this use `low_ratio_multiplier`.
    pub low_ratio_breakpoint: f64,
    /// Upper bound (inclusive) of the weak tier.
    pub weak_ratio_breakpoint: f64,
    /// Upper bound (inclusive) of the moderate tier.
    pub moderate_ratio_breakpoint: f64,
    /// Multiplier for match ratios below `low_ratio_breakpoint`.
    pub low_ratio_multiplier: f64,
    /// Multiplier for `[low, weak]` match ratios.
    pub weak_ratio_multiplier: f64,
    /// Multiplier for `(weak, moderate]` match ratios.
    pub moderate_ratio_multiplier: f64,
    /// Boost for strong ratios backed by many high-quality pairs.
    pub quality_boost: f64,
    /// High-quality pairs needed before the boost applies.
    pub quality_boost_min_pairs: usize,
}

impl MatcherConfig {
    /// Default descriptor radius.
    pub const DEFAULT_DESCRIPTOR_RADIUS: f64 = 40.0;
    /// Default descriptor size.
    pub const DEFAULT_MAX_NEIGHBORS: usize = 8;
    /// Default acceptance threshold.
    pub const DEFAULT_ACCEPTANCE_THRESHOLD: f64 = 0.75;
    /// Default high-quality threshold.
    pub const DEFAULT_HIGH_QUALITY_THRESHOLD: f64 = 0.85;
    /// Default minimum minutiae count.
    pub const DEFAULT_MIN_MINUTIAE: usize = 5;
    /// Default count-ratio floor.
    pub const DEFAULT_COUNT_RATIO_FLOOR: f64 = 0.5;
    /// Default count-mismatch similarity.
    pub const DEFAULT_COUNT_MISMATCH_SIMILARITY: f64 = 0.3;
    /// Default decision threshold.
    pub const DEFAULT_DECISION_THRESHOLD: f64 = 0.7;
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            descriptor_radius: Self::DEFAULT_DESCRIPTOR_RADIUS,
            max_neighbors: Self::DEFAULT_MAX_NEIGHBORS,
            acceptance_threshold: Self::DEFAULT_ACCEPTANCE_THRESHOLD,
            high_quality_threshold: Self::DEFAULT_HIGH_QUALITY_THRESHOLD,
            min_minutiae: Self::DEFAULT_MIN_MINUTIAE,
            count_ratio_floor: Self::DEFAULT_COUNT_RATIO_FLOOR,
            count_mismatch_similarity: Self::DEFAULT_COUNT_MISMATCH_SIMILARITY,
            decision_threshold: Self::DEFAULT_DECISION_THRESHOLD,
            angle_tolerance: FRAC_PI_2,
            neighbor_distance_tolerance: 8.0,
            neighbor_angle_tolerance: 0.3,
            angle_weight: 0.3,
            neighbor_weight: 0.7,
            sub_score_floor: 0.7,
            weak_score_penalty: 0.6,
            empty_neighbors_similarity: 0.5,
            one_sided_neighbors_similarity: 0.2,
            low_ratio_breakpoint: 0.2,
            weak_ratio_breakpoint: 0.3,
            moderate_ratio_breakpoint: 0.5,
            low_ratio_multiplier: 0.3,
            weak_ratio_multiplier: 0.6,
            moderate_ratio_multiplier: 0.85,
            quality_boost: 1.15,
            quality_boost_min_pairs: 3,
        }
    }
}

/// Pipeline stage names, used when reporting degradations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// Normalization and enhancement.
    Preprocess,
    /// Otsu thresholding.
    Binarize,
    /// Zhang-Suen thinning.
    Skeletonize,
    /// Crossing-number detection.
    Minutiae,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preprocess => f.write_str("preprocess"),
            Self::Binarize => f.write_str("binarize"),
            Self::Skeletonize => f.write_str("skeletonize"),
            Self::Minutiae => f.write_str("minutiae"),
        }
    }
}

/// A stage that swallowed a failure and fell back to a simpler result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Degradation {
    /// The stage that degraded.
    pub stage: Stage,
    /// Human-readable cause.
    pub reason: String,
}

/// Errors that can occur around the pipeline.
///
/// Inside the core these are caught and turned into [`Degradation`]s;
/// only decoding surfaces them to callers.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// The image has a zero-sized side.
    #[error("image has zero width or height")]
    EmptyImage,

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- Dimensions tests ---

    #[test]
    fn dimensions_longer_side() {
        assert_eq!(Dimensions::new(300, 200).longer_side(), 300);
        assert_eq!(Dimensions::new(120, 480).longer_side(), 480);
    }

    #[test]
    fn dimensions_empty() {
        assert!(Dimensions::new(0, 10).is_empty());
        assert!(!Dimensions::new(1, 1).is_empty());
    }

    // --- Angle helpers ---

    #[test]
    fn ridge_angle_folds_into_half_turn() {
        assert!((normalize_ridge_angle(PI) - 0.0).abs() < 1e-12);
        assert!((normalize_ridge_angle(-FRAC_PI_2) - FRAC_PI_2).abs() < 1e-12);
        assert!((normalize_ridge_angle(5.0 * PI / 4.0) - PI / 4.0).abs() < 1e-12);
        let tiny = normalize_ridge_angle(-1e-18);
        assert!((0.0..PI).contains(&tiny));
    }

    #[test]
    fn signed_angle_wraps_into_range() {
        assert!((normalize_signed_angle(PI) - (-PI)).abs() < 1e-12);
        assert!((normalize_signed_angle(3.0 * PI / 2.0) - (-FRAC_PI_2)).abs() < 1e-12);
        assert!((normalize_signed_angle(-0.25) - (-0.25)).abs() < 1e-12);
    }

    #[test]
    fn ridge_angle_difference_wraps_around_pi() {
        let d = ridge_angle_difference(0.05, PI - 0.05);
        assert!((d - 0.1).abs() < 1e-9, "got {d}");
        assert!((ridge_angle_difference(0.0, FRAC_PI_2) - FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn non_finite_angles_map_to_zero() {
        assert!(normalize_ridge_angle(f64::NAN).abs() < f64::EPSILON);
        assert!(normalize_signed_angle(f64::INFINITY).abs() < f64::EPSILON);
    }

    // --- RidgeMask tests ---

    #[test]
    fn mask_from_raw_rejects_wrong_length() {
        assert!(RidgeMask::from_raw(3, 3, vec![false; 8]).is_none());
        assert!(RidgeMask::from_raw(3, 3, vec![false; 9]).is_some());
    }

    #[test]
    fn mask_out_of_bounds_is_background() {
        let mut mask = RidgeMask::new(4, 4);
        mask.set(10, 10, true);
        assert_eq!(mask.ridge_count(), 0);
        assert!(!mask.get(4, 0));
        assert!(!mask.get_signed(-1, 2));
    }

    #[test]
    fn mask_gray_round_trip_preserves_pixels() {
        let mut mask = RidgeMask::new(5, 3);
        mask.set(1, 1, true);
        mask.set(4, 2, true);
        let back = RidgeMask::from_gray(&mask.to_gray());
        assert_eq!(back, mask);
    }

    // --- Minutia tests ---

    #[test]
    fn minutia_new_normalizes_angle() {
        let m = Minutia::new(1, 2, MinutiaKind::RidgeEnding, 3.0 * PI / 2.0);
        assert!((m.angle - FRAC_PI_2).abs() < 1e-12);
        for angle in [-0.3, PI, 7.5, -4.0 * PI] {
            let m = Minutia::new(0, 0, MinutiaKind::Bifurcation, angle);
            assert!((0.0..PI).contains(&m.angle), "{angle} folded to {}", m.angle);
        }
    }

    #[test]
    fn minutia_distance() {
        let a = Minutia::new(0, 0, MinutiaKind::RidgeEnding, 0.0);
        let b = Minutia::new(3, 4, MinutiaKind::Bifurcation, 0.0);
        assert!((a.distance(&b) - 5.0).abs() < f64::EPSILON);
    }

    // --- MatchResult tests ---

    #[test]
    fn match_result_confidence_equals_similarity() {
        let r = MatchResult::from_similarity(0.72, 0.7);
        assert!(r.is_match);
        assert!((r.confidence - r.similarity).abs() < f64::EPSILON);
    }

    #[test]
    fn match_result_threshold_is_inclusive() {
        assert!(MatchResult::from_similarity(0.7, 0.7).is_match);
        assert!(!MatchResult::from_similarity(0.69, 0.7).is_match);
    }

    // --- Config tests ---

    #[test]
    fn extractor_config_defaults_match_calibration() {
        let config = ExtractorConfig::default();
        assert_eq!(config.normalization_size, 500);
        assert_eq!(config.skeleton_working_size, 300);
        assert_eq!(config.max_thinning_iterations, 25);
        assert_eq!(config.border_margin, 5);
        assert!((config.min_separation - 10.0).abs() < f64::EPSILON);
        assert!(config.early_termination);
    }

    #[test]
    fn early_termination_threshold_has_floor() {
        let config = ExtractorConfig::default();
        assert_eq!(config.early_termination_threshold(100), 5);
        // 300 x 225 pixels -> 0.2% = 135
        assert_eq!(config.early_termination_threshold(300 * 225), 135);
    }

    #[test]
    fn matcher_config_defaults_match_calibration() {
        let config = MatcherConfig::default();
        assert!((config.descriptor_radius - 40.0).abs() < f64::EPSILON);
        assert_eq!(config.max_neighbors, 8);
        assert!((config.acceptance_threshold - 0.75).abs() < f64::EPSILON);
        assert!((config.high_quality_threshold - 0.85).abs() < f64::EPSILON);
        assert_eq!(config.min_minutiae, 5);
        assert!((config.count_ratio_floor - 0.5).abs() < f64::EPSILON);
        assert!((config.decision_threshold - 0.7).abs() < f64::EPSILON);
        assert!((config.quality_boost - 1.15).abs() < f64::EPSILON);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn partial_config_json_fills_defaults() {
        let config: MatcherConfig = serde_json::from_str(r#"{"decision_threshold":0.6}"#).unwrap();
        assert!((config.decision_threshold - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.max_neighbors, 8);

        let extractor: ExtractorConfig =
            serde_json::from_str(r#"{"polarity":"Auto","enhance":{"clahe_tiles":4}}"#).unwrap();
        assert_eq!(extractor.polarity, RidgePolarity::Auto);
        assert_eq!(extractor.enhance.clahe_tiles, 4);
        assert!((extractor.enhance.clahe_clip_limit - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn capture_source_from_flag() {
        assert_eq!(CaptureSource::from_gallery_flag(true), CaptureSource::Gallery);
        assert!(!CaptureSource::from_gallery_flag(false).needs_enhancement());
    }
}
