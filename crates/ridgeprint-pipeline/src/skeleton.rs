//! Zhang-Suen thinning of a ridge mask down to 1-pixel-wide centerlines.
//!
//! The mask is first reduced to the skeleton working size (the longer
//! side at most `skeleton_working_size`), then thinned in place. Each
//! outer iteration runs two sub-iterations; a sub-iteration decides all
//! deletions against the grid as it stood when the sub-iteration began,
//! then commits them, so sub-iteration 2 always sees the pixels removed
//! by sub-iteration 1.
//!
//! Neighbor labels follow the usual convention, clockwise from the top:
//!
//! ```text
//! P9 P2 P3
//! P8 P1 P4
//! P7 P6 P5
//! ```

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, ExtractorConfig, RidgeMask};

/// Offsets of P2..P9 relative to P1.
const NEIGHBOR_OFFSETS: [(i64, i64); 8] = [
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
];

// Indices into the neighbor array.
const P2: usize = 0;
const P4: usize = 2;
const P6: usize = 4;
const P8: usize = 6;

/// Why thinning stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThinningOutcome {
    /// A full iteration deleted nothing.
    Converged,
    /// A sub-iteration deleted fewer pixels than the early-termination
    /// threshold.
    EarlyStopped,
    /// The iteration cap was reached while pixels were still deleted.
    IterationCap,
}

/// Summary of a thinning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinningReport {
    /// Outer iterations executed.
    pub iterations: u32,
    /// Total pixels deleted.
    pub deleted: u64,
    /// Why thinning stopped.
    pub outcome: ThinningOutcome,
}

/// A thinned ridge mask at skeleton working resolution.
#[derive(Debug, Clone)]
pub struct Skeleton {
    /// The 1-pixel-wide skeleton.
    pub mask: RidgeMask,
    /// Working size / source longer side; 1.0 when no downscale happened.
    pub scale: f64,
    /// Dimensions of the mask before downscaling.
    pub source_dimensions: Dimensions,
    /// How thinning went.
    pub report: ThinningReport,
}

/// Which of the two Zhang-Suen sub-iterations to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubIteration {
    First,
    Second,
}

/// Scale factor mapping source pixels onto the skeleton working grid.
///
/// Only downscales: images whose longer side already fits return 1.0.
#[must_use]
pub fn working_scale(source: Dimensions, working_size: u32) -> f64 {
    let longer = source.longer_side();
    if longer == 0 || working_size == 0 || longer <= working_size {
        return 1.0;
    }
    f64::from(working_size) / f64::from(longer)
}

/// Nearest-neighbor downscale of a mask by `scale` (`<= 1`).
#[must_use = "returns the downscaled mask"]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn downscale_mask(mask: &RidgeMask, scale: f64) -> RidgeMask {
    if (scale - 1.0).abs() < f64::EPSILON || mask.dimensions().is_empty() {
        return mask.clone();
    }
    let side = |s: u32| ((f64::from(s) * scale).round() as u32).max(1);
    let (w, h) = (side(mask.width()), side(mask.height()));
    let resized = image::imageops::resize(
        &mask.to_gray(),
        w,
        h,
        image::imageops::FilterType::Nearest,
    );
    RidgeMask::from_gray(&resized)
}

/// P2..P9 of `(x, y)`; pixels outside the grid are background.
pub(crate) fn neighbors(grid: &RidgeMask, x: u32, y: u32) -> [bool; 8] {
    let (x, y) = (i64::from(x), i64::from(y));
    NEIGHBOR_OFFSETS.map(|(dx, dy)| grid.get_signed(x + dx, y + dy))
}

/// Number of 0 -> 1 transitions walking P2, P3, ..., P9, P2.
fn transitions(n: &[bool; 8]) -> usize {
    (0..8).filter(|&i| !n[i] && n[(i + 1) % 8]).count()
}

fn is_deletable(n: &[bool; 8], step: SubIteration) -> bool {
    let b = n.iter().filter(|&&p| p).count();
    if !(2..=6).contains(&b) || transitions(n) != 1 {
        return false;
    }
    match step {
        SubIteration::First => !(n[P2] && n[P4] && n[P6]) && !(n[P4] && n[P6] && n[P8]),
        SubIteration::Second => !(n[P2] && n[P4] && n[P8]) && !(n[P2] && n[P6] && n[P8]),
    }
}

/// Run one sub-iteration: mark against the current grid, then commit.
fn sub_iteration(grid: &mut RidgeMask, step: SubIteration) -> usize {
    let mut marked = Vec::new();
    for y in 0..grid.height() {
        for x in 0..grid.width() {
            if grid.get(x, y) && is_deletable(&neighbors(grid, x, y), step) {
                marked.push((x, y));
            }
        }
    }
    for &(x, y) in &marked {
        grid.set(x, y, false);
    }
    marked.len()
}

/// One full Zhang-Suen iteration (both sub-iterations). Returns the
/// number of pixels deleted.
///
/// On a converged skeleton this deletes nothing.
pub fn thinning_pass(grid: &mut RidgeMask) -> usize {
    let first = sub_iteration(grid, SubIteration::First);
    let second = sub_iteration(grid, SubIteration::Second);
    first + second
}

/// Thin `grid` in place.
///
/// Stops when an iteration deletes nothing, after `max_iterations`, or,
/// when `early_stop` is `Some(n)`, as soon as a sub-iteration deletes at
/// least one but fewer than `n` pixels. A sub-iteration that deletes
/// nothing never stops thinning early.
pub fn thin(grid: &mut RidgeMask, max_iterations: u32, early_stop: Option<u64>) -> ThinningReport {
    let mut deleted_total = 0u64;
    for iteration in 1..=max_iterations {
        let mut deleted = 0u64;
        for step in [SubIteration::First, SubIteration::Second] {
            let removed = sub_iteration(grid, step) as u64;
            deleted += removed;
            if removed > 0 && early_stop.is_some_and(|min| removed < min) {
                return ThinningReport {
                    iterations: iteration,
                    deleted: deleted_total + deleted,
                    outcome: ThinningOutcome::EarlyStopped,
                };
            }
        }
        deleted_total += deleted;

        if deleted == 0 {
            return ThinningReport {
                iterations: iteration,
                deleted: deleted_total,
                outcome: ThinningOutcome::Converged,
            };
        }
    }

    ThinningReport {
        iterations: max_iterations,
        deleted: deleted_total,
        outcome: ThinningOutcome::IterationCap,
    }
}

/// Downscale a ridge mask to the working size and thin it.
#[must_use = "returns the skeleton"]
pub fn skeletonize(mask: &RidgeMask, config: &ExtractorConfig) -> Skeleton {
    let source_dimensions = mask.dimensions();
    let scale = working_scale(source_dimensions, config.skeleton_working_size);
    let mut grid = downscale_mask(mask, scale);

    let early_stop = config
        .early_termination
        .then(|| config.early_termination_threshold(grid.dimensions().pixel_count()));
    let report = thin(&mut grid, config.max_thinning_iterations, early_stop);

    tracing::debug!(
        working = %grid.dimensions(),
        scale,
        iterations = report.iterations,
        outcome = ?report.outcome,
        skeleton_pixels = grid.ridge_count(),
        "skeletonized mask",
    );

    Skeleton {
        mask: grid,
        scale,
        source_dimensions,
        report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_rect(w: u32, h: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> RidgeMask {
        let mut mask = RidgeMask::new(w, h);
        for y in y0..y1 {
            for x in x0..x1 {
                mask.set(x, y, true);
            }
        }
        mask
    }

    /// Largest number of ridge pixels in any single column.
    fn max_column_thickness(mask: &RidgeMask) -> usize {
        (0..mask.width())
            .map(|x| (0..mask.height()).filter(|&y| mask.get(x, y)).count())
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn transitions_counts_rising_edges() {
        let n = [true, false, true, false, false, false, false, false];
        assert_eq!(transitions(&n), 2);
        let n = [true, true, false, false, false, false, false, false];
        assert_eq!(transitions(&n), 1);
        assert_eq!(transitions(&[false; 8]), 0);
        assert_eq!(transitions(&[true; 8]), 0);
    }

    #[test]
    fn isolated_pixel_survives() {
        let mut grid = RidgeMask::new(5, 5);
        grid.set(2, 2, true);
        let report = thin(&mut grid, 25, None);
        assert_eq!(report.outcome, ThinningOutcome::Converged);
        assert_eq!(grid.ridge_count(), 1);
    }

    #[test]
    fn thick_bar_thins_to_single_line() {
        let mut grid = filled_rect(30, 15, 3, 5, 27, 10);
        let report = thin(&mut grid, 25, None);
        assert_eq!(report.outcome, ThinningOutcome::Converged);
        assert_eq!(max_column_thickness(&grid), 1);
        assert!(grid.ridge_count() >= 15, "bar should leave a long centerline");
    }

    #[test]
    fn converged_skeleton_is_idempotent() {
        let mut grid = filled_rect(40, 40, 5, 5, 35, 12);
        for y in 12..35 {
            for x in 15..22 {
                grid.set(x, y, true);
            }
        }
        let report = thin(&mut grid, 100, None);
        assert_eq!(report.outcome, ThinningOutcome::Converged);
        let before = grid.clone();
        assert_eq!(thinning_pass(&mut grid), 0);
        assert_eq!(grid, before);
    }

    #[test]
    fn iteration_cap_is_respected() {
        let mut grid = filled_rect(60, 60, 2, 2, 58, 58);
        let report = thin(&mut grid, 2, None);
        assert_eq!(report.iterations, 2);
        assert_eq!(report.outcome, ThinningOutcome::IterationCap);
    }

    #[test]
    fn early_stop_triggers_on_small_deletions() {
        // A 3-px bar loses well under 1000 pixels per iteration.
        let mut grid = filled_rect(30, 10, 2, 3, 28, 6);
        let report = thin(&mut grid, 25, Some(1_000));
        assert_eq!(report.outcome, ThinningOutcome::EarlyStopped);
        assert_eq!(report.iterations, 1);
    }

    /// Right triangle with legs of `legs` pixels, corner at `(3, 3)`.
    fn triangle(side: u32, legs: u32) -> RidgeMask {
        let mut mask = RidgeMask::new(side, side);
        for y in 0..legs {
            for x in 0..legs - y {
                mask.set(3 + x, 3 + y, true);
            }
        }
        mask
    }

    #[test]
    fn early_stop_checks_each_sub_iteration() {
        // The first sub-iteration peels 21 pixels off the triangle and
        // the second 51, so the full iteration clears 30 but the first
        // half does not.
        let mut whole = triangle(30, 20);
        let mut reference = whole.clone();
        assert_eq!(thinning_pass(&mut reference), 72);

        let report = thin(&mut whole, 25, Some(30));
        assert_eq!(report.outcome, ThinningOutcome::EarlyStopped);
        assert_eq!(report.iterations, 1);
        assert_eq!(report.deleted, 21);
        assert_eq!(whole.ridge_count(), 210 - 21);
    }

    #[test]
    fn working_scale_only_downscales() {
        assert!((working_scale(Dimensions::new(200, 100), 300) - 1.0).abs() < f64::EPSILON);
        assert!((working_scale(Dimensions::new(500, 375), 300) - 0.6).abs() < 1e-12);
        assert!((working_scale(Dimensions::new(0, 0), 300) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn downscale_mask_dimensions() {
        let mask = filled_rect(500, 375, 100, 100, 200, 200);
        let small = downscale_mask(&mask, 0.6);
        assert_eq!(small.dimensions(), Dimensions::new(300, 225));
        assert!(small.ridge_count() > 0);
    }

    #[test]
    fn skeletonize_records_scale_and_source() {
        let mask = filled_rect(500, 250, 50, 100, 450, 130);
        let config = ExtractorConfig {
            early_termination: false,
            ..ExtractorConfig::default()
        };
        let skeleton = skeletonize(&mask, &config);
        assert!((skeleton.scale - 0.6).abs() < 1e-12);
        assert_eq!(skeleton.source_dimensions, Dimensions::new(500, 250));
        assert_eq!(skeleton.mask.dimensions(), Dimensions::new(300, 150));
        assert_eq!(skeleton.report.outcome, ThinningOutcome::Converged);
        assert_eq!(max_column_thickness(&skeleton.mask), 1);
    }

    #[test]
    fn empty_mask_converges_immediately() {
        let mut grid = RidgeMask::new(0, 0);
        let report = thin(&mut grid, 25, Some(5));
        assert_eq!(report.outcome, ThinningOutcome::Converged);
        assert_eq!(report.iterations, 1);
    }
}
