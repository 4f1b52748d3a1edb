//! Incremental extraction: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! Unlike [`crate::extract`] which runs every stage in one call,
//! [`Pipeline`] lets the caller drive execution one step at a time:
//!
//! ```rust
//! # use ridgeprint_pipeline::{CaptureSource, DynamicImage, ExtractorConfig, Pipeline};
//! # fn run(image: DynamicImage) {
//! let staged = Pipeline::new(image, CaptureSource::Gallery, ExtractorConfig::default())
//!     .preprocess()
//!     .binarize()
//!     .skeletonize()
//!     .detect_minutiae()
//!     .into_result();
//! println!("{} minutiae", staged.features.len());
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next pipeline state,
//! carrying all previously computed intermediates. No stage can fail:
//! problems are recorded as [`Degradation`]s and processing continues
//! with a simpler or empty result.

use image::DynamicImage;

use crate::binarize::Binarized;
use crate::diagnostics::StageMetrics;
use crate::minutiae::Detection;
use crate::preprocess::Preprocessed;
use crate::skeleton::Skeleton;
use crate::types::{
    CaptureSource, Degradation, Dimensions, ExtractorConfig, FeatureSet, GrayImage, MinutiaKind,
    Stage,
};

/// Every intermediate of one extraction run.
#[derive(Debug, Clone)]
pub struct StagedExtraction {
    /// Normalized (and possibly enhanced) grayscale image.
    pub normalized: GrayImage,
    /// Dimensions of the input image.
    pub source_dimensions: Dimensions,
    /// Whether the gallery enhancement chain ran.
    pub enhanced: bool,
    /// Thresholded ridge mask.
    pub binarized: Binarized,
    /// Thinned skeleton at working resolution.
    pub skeleton: Skeleton,
    /// Candidates found before the separation filter.
    pub raw_minutiae: usize,
    /// The extracted feature set.
    pub features: FeatureSet,
    /// Stages that fell back to a simpler result.
    pub degradations: Vec<Degradation>,
}

impl StagedExtraction {
    /// Whether every stage ran without falling back.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.degradations.is_empty()
    }
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
///
/// Call [`preprocess`](Self::preprocess) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .preprocess() to continue"]
pub struct Pending {
    config: ExtractorConfig,
    source: CaptureSource,
    image: DynamicImage,
}

impl Pending {
    /// The input image.
    #[must_use]
    pub const fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Normalize the input and advance to [`Normalized`].
    pub fn preprocess(self) -> Normalized {
        let preprocessed = crate::preprocess::preprocess(&self.image, self.source, &self.config);
        let degradations = preprocessed.degradation.clone().into_iter().collect();
        Normalized {
            config: self.config,
            preprocessed,
            degradations,
        }
    }
}

// ───────────────────────── Stage 1: Normalized ───────────────────────

/// Pipeline state after normalization (and enhancement for gallery
/// inputs).
///
/// Call [`binarize`](Self::binarize) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .binarize() to continue"]
pub struct Normalized {
    config: ExtractorConfig,
    preprocessed: Preprocessed,
    degradations: Vec<Degradation>,
}

impl Normalized {
    /// The normalized grayscale image.
    #[must_use]
    pub const fn normalized(&self) -> &GrayImage {
        &self.preprocessed.image
    }

    /// Threshold the normalized image and advance to [`Thresholded`].
    pub fn binarize(mut self) -> Thresholded {
        let image = &self.preprocessed.image;
        if image.width() == 0 || image.height() == 0 {
            tracing::warn!("normalized image is empty, nothing to binarize");
            self.degradations.push(Degradation {
                stage: Stage::Binarize,
                reason: "normalized image is empty".to_owned(),
            });
        }
        let binarized = crate::binarize::binarize(image, self.config.polarity);
        Thresholded {
            config: self.config,
            preprocessed: self.preprocessed,
            binarized,
            degradations: self.degradations,
        }
    }

    /// Metrics for the work done to reach this stage.
    pub(crate) fn stage_metrics(&self) -> StageMetrics {
        let source = self.preprocessed.source_dimensions;
        let image = &self.preprocessed.image;
        StageMetrics::Preprocess {
            source_width: source.width,
            source_height: source.height,
            width: image.width(),
            height: image.height(),
            enhanced: self.preprocessed.enhanced,
            fallback: self.preprocessed.degradation.is_some(),
        }
    }
}

// ───────────────────────── Stage 2: Thresholded ──────────────────────

/// Pipeline state after Otsu thresholding.
///
/// Call [`skeletonize`](Self::skeletonize) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .skeletonize() to continue"]
pub struct Thresholded {
    config: ExtractorConfig,
    preprocessed: Preprocessed,
    binarized: Binarized,
    degradations: Vec<Degradation>,
}

impl Thresholded {
    /// The binary ridge mask.
    #[must_use]
    pub const fn binarized(&self) -> &Binarized {
        &self.binarized
    }

    /// Thin the ridge mask and advance to [`Thinned`].
    pub fn skeletonize(self) -> Thinned {
        let skeleton = crate::skeleton::skeletonize(&self.binarized.mask, &self.config);
        Thinned {
            config: self.config,
            preprocessed: self.preprocessed,
            binarized: self.binarized,
            skeleton,
            degradations: self.degradations,
        }
    }

    /// Metrics for the work done to reach this stage.
    pub(crate) fn stage_metrics(&self) -> StageMetrics {
        StageMetrics::Binarize {
            threshold: self.binarized.threshold,
            dark_ridges: self.binarized.dark_ridges,
            ridge_pixels: self.binarized.mask.ridge_count(),
            total_pixels: self.binarized.mask.dimensions().pixel_count(),
        }
    }
}

// ───────────────────────── Stage 3: Thinned ──────────────────────────

/// Pipeline state after Zhang-Suen thinning.
///
/// Call [`detect_minutiae`](Self::detect_minutiae) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .detect_minutiae() to continue"]
pub struct Thinned {
    config: ExtractorConfig,
    preprocessed: Preprocessed,
    binarized: Binarized,
    skeleton: Skeleton,
    degradations: Vec<Degradation>,
}

impl Thinned {
    /// The skeleton at working resolution.
    #[must_use]
    pub const fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    /// Detect minutiae and advance to the final [`Detected`] stage.
    pub fn detect_minutiae(mut self) -> Detected {
        let detection = crate::minutiae::detect_minutiae(&self.skeleton, &self.config);
        if let Some(degradation) = &detection.degradation {
            self.degradations.push(degradation.clone());
        }
        Detected {
            preprocessed: self.preprocessed,
            binarized: self.binarized,
            skeleton: self.skeleton,
            detection,
            degradations: self.degradations,
        }
    }

    /// Metrics for the work done to reach this stage.
    pub(crate) fn stage_metrics(&self) -> StageMetrics {
        let working = self.skeleton.mask.dimensions();
        StageMetrics::Skeletonize {
            working_width: working.width,
            working_height: working.height,
            scale: self.skeleton.scale,
            iterations: self.skeleton.report.iterations,
            outcome: self.skeleton.report.outcome,
            skeleton_pixels: self.skeleton.mask.ridge_count(),
        }
    }
}

// ───────────────────────── Stage 4: Detected ─────────────────────────

/// Pipeline state after minutia detection, the final stage.
///
/// Call [`into_result`](Self::into_result) to extract the
/// [`StagedExtraction`].
#[must_use = "call .into_result() to extract the StagedExtraction"]
pub struct Detected {
    preprocessed: Preprocessed,
    binarized: Binarized,
    skeleton: Skeleton,
    detection: Detection,
    degradations: Vec<Degradation>,
}

impl Detected {
    /// The detection result.
    #[must_use]
    pub const fn detection(&self) -> &Detection {
        &self.detection
    }

    /// Consume the pipeline and return every intermediate.
    pub fn into_result(self) -> StagedExtraction {
        let image = self.preprocessed.image;
        let dimensions = Dimensions::new(image.width(), image.height());
        StagedExtraction {
            normalized: image,
            source_dimensions: self.preprocessed.source_dimensions,
            enhanced: self.preprocessed.enhanced,
            binarized: self.binarized,
            skeleton: self.skeleton,
            raw_minutiae: self.detection.raw_count,
            features: FeatureSet::new(self.detection.minutiae, dimensions),
            degradations: self.degradations,
        }
    }

    /// Metrics for the work done to reach this stage.
    pub(crate) fn stage_metrics(&self) -> StageMetrics {
        let count = |kind| self.detection.minutiae.iter().filter(|m| m.kind == kind).count();
        StageMetrics::Minutiae {
            raw: self.detection.raw_count,
            kept: self.detection.minutiae.len(),
            endings: count(MinutiaKind::RidgeEnding),
            bifurcations: count(MinutiaKind::Bifurcation),
        }
    }
}

// ───────────────────── Uniform stage access ──────────────────────────

/// Total number of stages, [`Pending`] included.
pub const STAGE_COUNT: usize = 5;

/// Trait implemented by every pipeline stage, enabling uniform iteration.
pub trait PipelineStage: Sized {
    /// Short name of this stage (e.g. `"binarize"`).
    const NAME: &str;

    /// Zero-based index of this stage (`0` for [`Pending`]).
    const INDEX: usize;

    /// Metrics for the work done to reach this state. `None` for
    /// [`Pending`].
    fn metrics(&self) -> Option<StageMetrics>;

    /// Advance to the next stage, or `None` at the final stage.
    fn next(self) -> Option<PipelineState>;

    /// Run all remaining stages and return the final result.
    fn complete(self) -> StagedExtraction;
}

impl PipelineStage for Pending {
    const NAME: &str = "source";
    const INDEX: usize = 0;

    fn metrics(&self) -> Option<StageMetrics> {
        None
    }

    fn next(self) -> Option<PipelineState> {
        Some(PipelineState::Normalized(self.preprocess()))
    }

    fn complete(self) -> StagedExtraction {
        self.preprocess().complete()
    }
}

impl PipelineStage for Normalized {
    const NAME: &str = "preprocess";
    const INDEX: usize = 1;

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Option<PipelineState> {
        Some(PipelineState::Thresholded(self.binarize()))
    }

    fn complete(self) -> StagedExtraction {
        self.binarize().complete()
    }
}

impl PipelineStage for Thresholded {
    const NAME: &str = "binarize";
    const INDEX: usize = 2;

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Option<PipelineState> {
        Some(PipelineState::Thinned(self.skeletonize()))
    }

    fn complete(self) -> StagedExtraction {
        self.skeletonize().complete()
    }
}

impl PipelineStage for Thinned {
    const NAME: &str = "skeletonize";
    const INDEX: usize = 3;

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Option<PipelineState> {
        Some(PipelineState::Detected(self.detect_minutiae()))
    }

    fn complete(self) -> StagedExtraction {
        self.detect_minutiae().into_result()
    }
}

impl PipelineStage for Detected {
    const NAME: &str = "minutiae";
    const INDEX: usize = 4;

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Option<PipelineState> {
        None
    }

    fn complete(self) -> StagedExtraction {
        self.into_result()
    }
}

/// Enum wrapping all pipeline stages for uniform, loopable access.
///
/// ```rust
/// # use ridgeprint_pipeline::{CaptureSource, DynamicImage, ExtractorConfig, Pipeline};
/// # use ridgeprint_pipeline::pipeline::{Advance, PipelineState};
/// # fn run(image: DynamicImage) {
/// let mut state: PipelineState =
///     Pipeline::new(image, CaptureSource::Capture, ExtractorConfig::default()).into();
/// loop {
///     match state.advance() {
///         Advance::Next(next) => state = next,
///         Advance::Complete(done) => { state = done; break; }
///     }
/// }
/// let result = state.complete();
/// # }
/// ```
#[must_use]
pub enum PipelineState {
    /// See [`Pending`].
    Pending(Pending),
    /// See [`Normalized`].
    Normalized(Normalized),
    /// See [`Thresholded`].
    Thresholded(Thresholded),
    /// See [`Thinned`].
    Thinned(Thinned),
    /// See [`Detected`].
    Detected(Detected),
}

/// Result of [`PipelineState::advance`].
#[must_use]
pub enum Advance {
    /// The pipeline advanced to this next stage.
    Next(PipelineState),
    /// The pipeline was already at the final stage; returned unchanged.
    Complete(PipelineState),
}

/// Delegate a method call to whichever variant is active.
macro_rules! delegate {
    ($self:ident, $method:ident) => {
        match $self {
            Self::Pending(s) => s.$method(),
            Self::Normalized(s) => s.$method(),
            Self::Thresholded(s) => s.$method(),
            Self::Thinned(s) => s.$method(),
            Self::Detected(s) => s.$method(),
        }
    };
}

// Lets the macro reach the trait's associated constants through `&self`.
trait StageMetadata {
    fn name(&self) -> &'static str;
    fn index(&self) -> usize;
}

impl<T: PipelineStage> StageMetadata for T {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn index(&self) -> usize {
        T::INDEX
    }
}

impl PipelineState {
    /// Name of the current stage.
    #[must_use]
    pub fn name(&self) -> &'static str {
        delegate!(self, name)
    }

    /// Zero-based index of the current stage.
    #[must_use]
    pub fn index(&self) -> usize {
        delegate!(self, index)
    }

    /// Metrics of the current stage.
    #[must_use]
    pub fn metrics(&self) -> Option<StageMetrics> {
        delegate!(self, metrics)
    }

    /// Whether the pipeline is at the final stage.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Detected(_))
    }

    /// Advance one stage, returning the final stage unchanged.
    pub fn advance(self) -> Advance {
        if self.is_complete() {
            return Advance::Complete(self);
        }
        // Only the final stage returns None, and it is handled above.
        #[allow(clippy::unreachable)]
        let next = delegate!(self, next)
            .unwrap_or_else(|| unreachable!("non-final stage returned None from next()"));
        Advance::Next(next)
    }

    /// Run all remaining stages to completion.
    pub fn complete(self) -> StagedExtraction {
        delegate!(self, complete)
    }
}

impl From<Pending> for PipelineState {
    fn from(s: Pending) -> Self {
        Self::Pending(s)
    }
}

impl From<Normalized> for PipelineState {
    fn from(s: Normalized) -> Self {
        Self::Normalized(s)
    }
}

impl From<Thresholded> for PipelineState {
    fn from(s: Thresholded) -> Self {
        Self::Thresholded(s)
    }
}

impl From<Thinned> for PipelineState {
    fn from(s: Thinned) -> Self {
        Self::Thinned(s)
    }
}

impl From<Detected> for PipelineState {
    fn from(s: Detected) -> Self {
        Self::Detected(s)
    }
}

// ───────────────────── Pipeline entry point ──────────────────────────

/// Incremental feature-extraction pipeline.
///
/// Created via [`Pipeline::new`], which stores the input without doing
/// any processing. Each stage method consumes the current state and
/// returns the next, so stages cannot be skipped or reordered.
pub struct Pipeline;

impl Pipeline {
    /// Create a new pipeline for one image.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(image: DynamicImage, source: CaptureSource, config: ExtractorConfig) -> Pending {
        Pending {
            config,
            source,
            image,
        }
    }
}
