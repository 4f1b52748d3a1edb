//! Descriptor-based fingerprint matching.
//!
//! Descriptors of the first feature set are greedily assigned, in order,
//! to the best-scoring still-unused descriptor of the second set. The
//! fraction of accepted pairs (relative to the larger set) is then scaled
//! by an empirically calibrated tier table to produce a similarity in
//! `[0, 1]`.
//!
//! The assignment runs A onto B only, so `compute_similarity(a, b)` and
//! `compute_similarity(b, a)` can differ.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::descriptor::{MinutiaDescriptor, Neighbor, build_descriptors};
use crate::types::{
    FeatureSet, MatchResult, MatcherConfig, normalize_signed_angle, ridge_angle_difference,
};

/// Which branch of the scoring rules produced a similarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreTier {
    /// A set had fewer than `min_minutiae` minutiae.
    InsufficientMinutiae,
    /// The count ratio was below `count_ratio_floor`; no matching ran.
    CountMismatch,
    /// Match ratio below `low_ratio_breakpoint`.
    VeryLow,
    /// Match ratio in `[low_ratio_breakpoint, weak_ratio_breakpoint]`.
    Weak,
    /// Match ratio in `(weak_ratio_breakpoint, moderate_ratio_breakpoint]`.
    Moderate,
    /// Match ratio above `moderate_ratio_breakpoint`.
    Strong,
}

/// Everything the scorer computed on the way to a similarity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityBreakdown {
    /// Final similarity in `[0, 1]`.
    pub similarity: f64,
    /// Accepted descriptor pairs.
    pub matched_pairs: usize,
    /// Accepted pairs scoring above `high_quality_threshold`.
    pub high_quality_pairs: usize,
    /// `matched_pairs / max(|A|, |B|)`.
    pub match_ratio: f64,
    /// Scoring branch taken.
    pub tier: ScoreTier,
}

impl SimilarityBreakdown {
    const fn early(similarity: f64, tier: ScoreTier) -> Self {
        Self {
            similarity,
            matched_pairs: 0,
            high_quality_pairs: 0,
            match_ratio: 0.0,
            tier,
        }
    }
}

/// One gallery entry scored against a probe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GalleryHit {
    /// Position of the entry in the gallery slice.
    pub index: usize,
    /// Outcome of matching the probe against this entry.
    pub result: MatchResult,
}

/// Similarity of two neighbor lists.
///
/// Each neighbor of `a` claims the first unused neighbor of `b` within
/// both the distance and the relative-angle tolerance. Twice the pair
/// count is divided by the mean list length and clamped to `[0, 1]`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn neighbor_similarity(a: &[Neighbor], b: &[Neighbor], config: &MatcherConfig) -> f64 {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return config.empty_neighbors_similarity,
        (true, false) | (false, true) => return config.one_sided_neighbors_similarity,
        (false, false) => {}
    }

    let mut used = vec![false; b.len()];
    let mut pairs = 0usize;
    for na in a {
        let partner = b.iter().enumerate().position(|(j, nb)| {
            !used[j]
                && (na.distance - nb.distance).abs() < config.neighbor_distance_tolerance
                && normalize_signed_angle(na.relative_angle - nb.relative_angle).abs()
                    < config.neighbor_angle_tolerance
        });
        if let Some(j) = partner {
            used[j] = true;
            pairs += 1;
        }
    }

    let mean_len = (a.len() + b.len()) as f64 / 2.0;
    (2.0 * pairs as f64 / mean_len).clamp(0.0, 1.0)
}

/// Score two descriptors in `[0, 1]`. Different minutia kinds score 0.
#[must_use]
pub fn descriptor_score(a: &MinutiaDescriptor, b: &MinutiaDescriptor, config: &MatcherConfig) -> f64 {
    if a.minutia.kind != b.minutia.kind {
        return 0.0;
    }

    let angle_diff = ridge_angle_difference(a.minutia.angle, b.minutia.angle);
    let angle_sim = (1.0 - angle_diff / config.angle_tolerance).clamp(0.0, 1.0);
    let neighbor_sim = neighbor_similarity(&a.neighbors, &b.neighbors, config);

    let combined = config
        .angle_weight
        .mul_add(angle_sim, config.neighbor_weight * neighbor_sim);
    if angle_sim > config.sub_score_floor && neighbor_sim > config.sub_score_floor {
        combined
    } else {
        combined * config.weak_score_penalty
    }
}

/// Greedy A-onto-B assignment. Returns `(matched, high_quality)`.
fn greedy_assign(
    a: &[MinutiaDescriptor],
    b: &[MinutiaDescriptor],
    config: &MatcherConfig,
) -> (usize, usize) {
    let mut used = vec![false; b.len()];
    let mut matched = 0;
    let mut high_quality = 0;

    for da in a {
        let mut best: Option<(usize, f64)> = None;
        for (j, db) in b.iter().enumerate() {
            if used[j] {
                continue;
            }
            let score = descriptor_score(da, db, config);
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((j, score));
            }
        }

        if let Some((j, score)) = best
            && score > config.acceptance_threshold
        {
            used[j] = true;
            matched += 1;
            if score > config.high_quality_threshold {
                high_quality += 1;
            }
        }
    }

    (matched, high_quality)
}

/// Map a match ratio onto a similarity using the calibrated tiers.
#[must_use]
pub fn tiered_similarity(
    match_ratio: f64,
    matched_pairs: usize,
    high_quality_pairs: usize,
    config: &MatcherConfig,
) -> (f64, ScoreTier) {
    let (multiplier, tier) = if match_ratio < config.low_ratio_breakpoint {
        (config.low_ratio_multiplier, ScoreTier::VeryLow)
    } else if match_ratio > config.moderate_ratio_breakpoint {
        let boosted = high_quality_pairs * 2 > matched_pairs
            && high_quality_pairs >= config.quality_boost_min_pairs;
        let boost = if boosted { config.quality_boost } else { 1.0 };
        (boost, ScoreTier::Strong)
    } else if match_ratio > config.weak_ratio_breakpoint {
        (config.moderate_ratio_multiplier, ScoreTier::Moderate)
    } else {
        (config.weak_ratio_multiplier, ScoreTier::Weak)
    };
    ((match_ratio * multiplier).clamp(0.0, 1.0), tier)
}

/// Score `a` against `b` and report how the score came about.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn score_features(a: &FeatureSet, b: &FeatureSet, config: &MatcherConfig) -> SimilarityBreakdown {
    let (na, nb) = (a.len(), b.len());
    if na == 0 || nb == 0 || na < config.min_minutiae || nb < config.min_minutiae {
        return SimilarityBreakdown::early(0.0, ScoreTier::InsufficientMinutiae);
    }

    let larger = na.max(nb) as f64;
    let count_ratio = na.min(nb) as f64 / larger;
    if count_ratio < config.count_ratio_floor {
        return SimilarityBreakdown::early(
            config.count_mismatch_similarity.clamp(0.0, 1.0),
            ScoreTier::CountMismatch,
        );
    }

    let descriptors_a = build_descriptors(a, config);
    let descriptors_b = build_descriptors(b, config);
    let (matched_pairs, high_quality_pairs) = greedy_assign(&descriptors_a, &descriptors_b, config);

    let match_ratio = matched_pairs as f64 / larger;
    let (similarity, tier) = tiered_similarity(match_ratio, matched_pairs, high_quality_pairs, config);

    tracing::trace!(
        probe = na,
        reference = nb,
        matched_pairs,
        high_quality_pairs,
        match_ratio,
        similarity,
        ?tier,
        "scored feature sets",
    );

    SimilarityBreakdown {
        similarity,
        matched_pairs,
        high_quality_pairs,
        match_ratio,
        tier,
    }
}

/// Similarity of `a` to `b` in `[0, 1]`. Not symmetric in general.
#[must_use]
pub fn compute_similarity(a: &FeatureSet, b: &FeatureSet, config: &MatcherConfig) -> f64 {
    score_features(a, b, config).similarity
}

/// Compare two feature sets and apply the decision threshold.
#[must_use]
pub fn match_features(a: &FeatureSet, b: &FeatureSet, config: &MatcherConfig) -> MatchResult {
    MatchResult::from_similarity(compute_similarity(a, b, config), config.decision_threshold)
}

/// Score a probe against every gallery entry in parallel.
///
/// Hits are ordered by descending similarity; equal similarities keep
/// gallery order.
#[must_use = "returns the ranked hits"]
pub fn rank_gallery(probe: &FeatureSet, gallery: &[FeatureSet], config: &MatcherConfig) -> Vec<GalleryHit> {
    let mut hits: Vec<GalleryHit> = gallery
        .par_iter()
        .enumerate()
        .map(|(index, entry)| GalleryHit {
            index,
            result: match_features(probe, entry, config),
        })
        .collect();

    hits.sort_by(|a, b| {
        b.result
            .similarity
            .total_cmp(&a.result.similarity)
            .then(a.index.cmp(&b.index))
    });
    hits
}
