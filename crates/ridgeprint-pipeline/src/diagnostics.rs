//! Extraction diagnostics: timing, counts, and other metrics per stage.
//!
//! [`extract_with_diagnostics`] runs the same stages as
//! [`extract_staged`](crate::extract_staged) and records how long each
//! took and what it produced. Timestamps come from a caller-supplied
//! [`Clock`] so the core stays free of any particular time source.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::{Duration, Instant};

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::pipeline::{Pipeline, StagedExtraction};
use crate::skeleton::ThinningOutcome;
use crate::types::{CaptureSource, ExtractorConfig};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Monotonic time source.
///
/// `now` returns the time elapsed since an arbitrary fixed origin; only
/// differences between readings are meaningful.
pub trait Clock {
    /// Current reading.
    fn now(&self) -> Duration;
}

/// [`Clock`] backed by [`std::time::Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Start a clock whose origin is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Diagnostics collected from a single extraction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionDiagnostics {
    /// Stage 1: normalization and enhancement.
    pub preprocess: StageDiagnostics,
    /// Stage 2: Otsu thresholding.
    pub binarize: StageDiagnostics,
    /// Stage 3: downscale and thinning.
    pub skeletonize: StageDiagnostics,
    /// Stage 4: crossing-number detection and separation filter.
    pub minutiae: StageDiagnostics,
    /// Total duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Number of stages that degraded.
    pub degradation_count: usize,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Normalization metrics.
    Preprocess {
        /// Input width in pixels.
        source_width: u32,
        /// Input height in pixels.
        source_height: u32,
        /// Normalized width in pixels.
        width: u32,
        /// Normalized height in pixels.
        height: u32,
        /// Whether the enhancement chain ran.
        enhanced: bool,
        /// Whether enhancement failed and the plain resize was used.
        fallback: bool,
    },
    /// Thresholding metrics.
    Binarize {
        /// Otsu level.
        threshold: u8,
        /// Whether the dark class was taken as ridge.
        dark_ridges: bool,
        /// Ridge pixels in the mask.
        ridge_pixels: u64,
        /// Total pixels in the mask.
        total_pixels: u64,
    },
    /// Thinning metrics.
    Skeletonize {
        /// Working grid width.
        working_width: u32,
        /// Working grid height.
        working_height: u32,
        /// Working size / source longer side.
        scale: f64,
        /// Thinning iterations executed.
        iterations: u32,
        /// Why thinning stopped.
        outcome: ThinningOutcome,
        /// Pixels left in the skeleton.
        skeleton_pixels: u64,
    },
    /// Detection metrics.
    Minutiae {
        /// Candidates before the separation filter.
        raw: usize,
        /// Minutiae kept.
        kept: usize,
        /// Kept ridge endings.
        endings: usize,
        /// Kept bifurcations.
        bifurcations: usize,
    },
}

impl ExtractionDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Extraction Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        if self.degradation_count > 0 {
            lines.push(format!("Degraded stages: {}", self.degradation_count));
        }
        lines.push(String::new());

        lines.push(format!(
            "{:<16} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let stages = [
            ("Preprocess", &self.preprocess),
            ("Binarize", &self.binarize),
            ("Skeletonize", &self.skeletonize),
            ("Minutiae", &self.minutiae),
        ];
        for (name, diag) in stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<16} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Preprocess {
            source_width,
            source_height,
            width,
            height,
            enhanced,
            fallback,
        } => {
            let mode = match (enhanced, fallback) {
                (true, _) => "enhanced",
                (false, true) => "fallback",
                (false, false) => "plain",
            };
            format!("{source_width}x{source_height} -> {width}x{height} ({mode})")
        }
        StageMetrics::Binarize {
            threshold,
            dark_ridges,
            ridge_pixels,
            total_pixels,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let density = if *total_pixels > 0 {
                *ridge_pixels as f64 / *total_pixels as f64 * 100.0
            } else {
                0.0
            };
            let polarity = if *dark_ridges { "dark" } else { "light" };
            format!("level={threshold} {polarity} ridges={ridge_pixels} ({density:.1}%)")
        }
        StageMetrics::Skeletonize {
            working_width,
            working_height,
            scale,
            iterations,
            outcome,
            skeleton_pixels,
        } => {
            format!(
                "{working_width}x{working_height} (x{scale:.3}) {iterations} iters {outcome:?}, {skeleton_pixels} px",
            )
        }
        StageMetrics::Minutiae {
            raw,
            kept,
            endings,
            bifurcations,
        } => {
            format!("{raw} raw -> {kept} kept ({endings} endings, {bifurcations} bifurcations)")
        }
    }
}

/// Time one stage transition.
fn timed<T>(clock: &impl Clock, step: impl FnOnce() -> T) -> (T, Duration) {
    let start = clock.now();
    let out = step();
    (out, clock.now().saturating_sub(start))
}

/// Run the extraction pipeline and record per-stage diagnostics.
#[must_use = "returns the extraction and its diagnostics"]
pub fn extract_with_diagnostics(
    image: DynamicImage,
    source: CaptureSource,
    config: ExtractorConfig,
    clock: &impl Clock,
) -> (StagedExtraction, ExtractionDiagnostics) {
    let start = clock.now();
    let pending = Pipeline::new(image, source, config);

    let (normalized, preprocess_time) = timed(clock, || pending.preprocess());
    let preprocess = StageDiagnostics {
        duration: preprocess_time,
        metrics: normalized.stage_metrics(),
    };

    let (thresholded, binarize_time) = timed(clock, || normalized.binarize());
    let binarize = StageDiagnostics {
        duration: binarize_time,
        metrics: thresholded.stage_metrics(),
    };

    let (thinned, skeletonize_time) = timed(clock, || thresholded.skeletonize());
    let skeletonize = StageDiagnostics {
        duration: skeletonize_time,
        metrics: thinned.stage_metrics(),
    };

    let (detected, minutiae_time) = timed(clock, || thinned.detect_minutiae());
    let minutiae = StageDiagnostics {
        duration: minutiae_time,
        metrics: detected.stage_metrics(),
    };

    let staged = detected.into_result();
    let total_duration = clock.now().saturating_sub(start);
    tracing::debug!(
        total_ms = duration_ms(total_duration),
        minutiae = staged.features.len(),
        "extraction finished"
    );

    let diagnostics = ExtractionDiagnostics {
        preprocess,
        binarize,
        skeletonize,
        minutiae,
        total_duration,
        degradation_count: staged.degradations.len(),
    };
    (staged, diagnostics)
}
