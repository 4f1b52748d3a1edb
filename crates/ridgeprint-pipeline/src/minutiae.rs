//! Crossing-number minutia detection on a ridge skeleton.
//!
//! For every skeleton pixel inside the border margin the crossing number,
//! here the count of foreground 8-neighbors, decides the class: 1 is a
//! ridge ending, 3 a bifurcation. Detected points
//! are mapped back from the skeleton working grid to the normalized image
//! and then thinned out so that every kept minutia lies strictly further
//! than `min_separation` from all previously kept ones.

use rstar::RTree;

use crate::skeleton::Skeleton;
use crate::types::{
    Degradation, Dimensions, ExtractorConfig, Minutia, MinutiaKind, RidgeMask, Stage,
    normalize_ridge_angle,
};

/// Result of minutia detection.
#[derive(Debug, Clone, Default)]
pub struct Detection {
    /// Minutiae in normalized-image coordinates, in scan order.
    pub minutiae: Vec<Minutia>,
    /// Candidates found before the separation filter.
    pub raw_count: usize,
    /// Set when the skeleton could not be processed.
    pub degradation: Option<Degradation>,
}

/// Crossing number of the skeleton pixel at `(x, y)`: how many of its
/// 8 neighbors are foreground.
#[must_use]
pub fn crossing_number(skeleton: &RidgeMask, x: u32, y: u32) -> usize {
    crate::skeleton::neighbors(skeleton, x, y)
        .iter()
        .filter(|&&p| p)
        .count()
}

/// Classify a crossing number.
#[must_use]
pub const fn classify(crossing_number: usize) -> Option<MinutiaKind> {
    match crossing_number {
        1 => Some(MinutiaKind::RidgeEnding),
        3 => Some(MinutiaKind::Bifurcation),
        _ => None,
    }
}

/// Local ridge orientation at `(x, y)`: the direction toward the nearest
/// foreground 8-neighbor, folded into `[0, pi)`.
///
/// 4-connected neighbors win over diagonal ones; among equally near
/// neighbors the first in row-major order (top-left first) is used.
/// Returns 0 for isolated pixels.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn orientation(skeleton: &RidgeMask, x: u32, y: u32) -> f64 {
    let (cx, cy) = (i64::from(x), i64::from(y));
    let mut best: Option<(i64, i64, i64)> = None;
    for dy in -1..=1_i64 {
        for dx in -1..=1_i64 {
            if (dx, dy) == (0, 0) || !skeleton.get_signed(cx + dx, cy + dy) {
                continue;
            }
            let d2 = dx * dx + dy * dy;
            if best.is_none_or(|(_, _, b)| d2 < b) {
                best = Some((dx, dy, d2));
            }
        }
    }
    best.map_or(0.0, |(dx, dy, _)| {
        normalize_ridge_angle((dy as f64).atan2(dx as f64))
    })
}

/// Map a skeleton-grid coordinate back to the normalized image.
///
/// Divides by `scale`, rounds, and clamps into `dims`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn rescale_to_source(x: u32, y: u32, scale: f64, dims: Dimensions) -> (u32, u32) {
    let map = |v: u32, limit: u32| {
        let scaled = (f64::from(v) / scale).round();
        let max = f64::from(limit.saturating_sub(1));
        scaled.clamp(0.0, max) as u32
    };
    (map(x, dims.width), map(y, dims.height))
}

/// Keep candidates, in order, whose distance to every previously kept
/// minutia is strictly greater than `min_separation`.
#[must_use]
pub fn enforce_min_separation<I>(candidates: I, min_separation: f64) -> Vec<Minutia>
where
    I: IntoIterator<Item = Minutia>,
{
    let radius_sq = min_separation.max(0.0).powi(2);
    let mut index: RTree<[f64; 2]> = RTree::new();
    let mut kept = Vec::new();

    for candidate in candidates {
        let p = candidate.position();
        let crowded = index.nearest_neighbor(&p).is_some_and(|q| {
            let (dx, dy) = (q[0] - p[0], q[1] - p[1]);
            dx.mul_add(dx, dy * dy) <= radius_sq
        });
        if !crowded {
            index.insert(p);
            kept.push(candidate);
        }
    }
    kept
}

/// Scan a skeleton grid for endings and bifurcations.
///
/// Returns candidates in skeleton coordinates, row-major order.
#[must_use]
pub fn scan_candidates(skeleton: &RidgeMask, border_margin: u32) -> Vec<Minutia> {
    let (w, h) = (skeleton.width(), skeleton.height());
    let x_end = w.saturating_sub(border_margin);
    let y_end = h.saturating_sub(border_margin);

    let mut found = Vec::new();
    for y in border_margin..y_end {
        for x in border_margin..x_end {
            if !skeleton.get(x, y) {
                continue;
            }
            if let Some(kind) = classify(crossing_number(skeleton, x, y)) {
                found.push(Minutia::new(x, y, kind, orientation(skeleton, x, y)));
            }
        }
    }
    found
}

/// Detect minutiae on a skeleton and express them in the normalized
/// image's coordinate space.
///
/// A degenerate skeleton (non-positive or non-finite scale) yields an
/// empty result with a [`Degradation`] instead of an error.
#[must_use = "returns the detected minutiae"]
pub fn detect_minutiae(skeleton: &Skeleton, config: &ExtractorConfig) -> Detection {
    if !skeleton.scale.is_finite() || skeleton.scale <= 0.0 {
        tracing::warn!(scale = skeleton.scale, "degenerate skeleton scale, no minutiae");
        return Detection {
            degradation: Some(Degradation {
                stage: Stage::Minutiae,
                reason: format!("invalid skeleton scale {}", skeleton.scale),
            }),
            ..Detection::default()
        };
    }

    let candidates = scan_candidates(&skeleton.mask, config.border_margin);
    let raw_count = candidates.len();

    let rescaled = candidates.into_iter().map(|m| {
        let (x, y) = rescale_to_source(m.x, m.y, skeleton.scale, skeleton.source_dimensions);
        Minutia { x, y, ..m }
    });
    let minutiae = enforce_min_separation(rescaled, config.min_separation);

    tracing::debug!(raw = raw_count, kept = minutiae.len(), "detected minutiae");

    Detection {
        minutiae,
        raw_count,
        degradation: None,
    }
}
