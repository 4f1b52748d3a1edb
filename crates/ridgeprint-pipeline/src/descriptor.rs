//! Local neighborhood descriptors.
//!
//! Each minutia is described by its nearest neighbors within a fixed
//! radius: the distance to each and the neighbor's ridge angle relative
//! to the center's. Both are invariant to translation, which is what the
//! matcher relies on.

use rstar::RTree;
use rstar::primitives::GeomWithData;
use serde::{Deserialize, Serialize};

use crate::types::{FeatureSet, MatcherConfig, Minutia, normalize_signed_angle};

/// Indexed minutia position.
type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// A neighbor as seen from a descriptor's center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Euclidean distance from the center, in pixels.
    pub distance: f64,
    /// `neighbor.angle - center.angle`, wrapped into `[-pi, pi)`.
    pub relative_angle: f64,
}

/// A minutia together with its local neighborhood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinutiaDescriptor {
    /// The center minutia.
    pub minutia: Minutia,
    /// Neighbors ordered by ascending distance (ties by input order).
    pub neighbors: Vec<Neighbor>,
}

/// Build one descriptor per minutia, in input order.
///
/// Neighbors are the other minutiae within `descriptor_radius`
/// (inclusive), closest first, truncated to `max_neighbors`. Minutiae
/// sharing a position still count as neighbors at distance 0.
#[must_use = "returns the descriptors"]
pub fn build_descriptors(features: &FeatureSet, config: &MatcherConfig) -> Vec<MinutiaDescriptor> {
    let minutiae = &features.minutiae;
    let tree: RTree<IndexedPoint> = RTree::bulk_load(
        minutiae
            .iter()
            .enumerate()
            .map(|(i, m)| GeomWithData::new(m.position(), i))
            .collect(),
    );

    let radius = config.descriptor_radius.max(0.0);
    let radius_sq = radius * radius;
    // Pad the query so rounding never drops a point sitting exactly on
    // the radius; the exact test is applied below.
    let query_sq = radius_sq.mul_add(1.0 + 1e-9, 1e-9);

    minutiae
        .iter()
        .enumerate()
        .map(|(i, center)| {
            let mut nearby: Vec<(f64, usize)> = tree
                .locate_within_distance(center.position(), query_sq)
                .filter(|p| p.data != i)
                .map(|p| (center.distance_squared(&minutiae[p.data]), p.data))
                .filter(|&(d2, _)| d2 <= radius_sq)
                .collect();
            nearby.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            nearby.truncate(config.max_neighbors);

            let neighbors = nearby
                .into_iter()
                .map(|(d2, j)| Neighbor {
                    distance: d2.sqrt(),
                    relative_angle: normalize_signed_angle(minutiae[j].angle - center.angle),
                })
                .collect();

            MinutiaDescriptor {
                minutia: *center,
                neighbors,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use super::*;
    use crate::types::MinutiaKind;

    fn ending(x: u32, y: u32, angle: f64) -> Minutia {
        Minutia::new(x, y, MinutiaKind::RidgeEnding, angle)
    }

    fn set(minutiae: Vec<Minutia>) -> FeatureSet {
        minutiae.into_iter().collect()
    }

    #[test]
    fn one_descriptor_per_minutia_in_order() {
        let features = set(vec![ending(10, 10, 0.1), ending(30, 10, 0.2), ending(200, 200, 0.3)]);
        let descriptors = build_descriptors(&features, &MatcherConfig::default());
        assert_eq!(descriptors.len(), 3);
        for (d, m) in descriptors.iter().zip(&features.minutiae) {
            assert_eq!(&d.minutia, m);
        }
        assert_eq!(descriptors[0].neighbors.len(), 1);
        assert!(descriptors[2].neighbors.is_empty());
    }

    #[test]
    fn radius_is_inclusive() {
        let features = set(vec![ending(0, 0, 0.0), ending(40, 0, 0.0), ending(41, 0, 0.0)]);
        let descriptors = build_descriptors(&features, &MatcherConfig::default());
        let distances: Vec<f64> = descriptors[0].neighbors.iter().map(|n| n.distance).collect();
        assert_eq!(distances, vec![40.0]);
    }

    #[test]
    fn neighbors_sorted_and_truncated() {
        let mut minutiae = vec![ending(100, 100, 0.0)];
        minutiae.extend((1..=12).rev().map(|k| ending(100 + k * 3, 100, 0.0)));
        let descriptors = build_descriptors(&set(minutiae), &MatcherConfig::default());
        let distances: Vec<f64> = descriptors[0].neighbors.iter().map(|n| n.distance).collect();
        assert_eq!(distances, vec![3.0, 6.0, 9.0, 12.0, 15.0, 18.0, 21.0, 24.0]);
    }

    #[test]
    fn equal_distance_ties_keep_input_order() {
        let features = set(vec![
            ending(50, 50, 0.0),
            ending(60, 50, 0.5),
            ending(40, 50, 1.0),
            ending(50, 60, 1.5),
        ]);
        let descriptors = build_descriptors(&features, &MatcherConfig::default());
        let angles: Vec<f64> = descriptors[0]
            .neighbors
            .iter()
            .map(|n| n.relative_angle)
            .collect();
        assert_eq!(angles.len(), 3);
        for (got, want) in angles.iter().zip([0.5, 1.0, 1.5]) {
            assert!((got - want).abs() < 1e-12, "got {angles:?}");
        }
    }

    #[test]
    fn relative_angle_is_signed() {
        let features = set(vec![ending(0, 0, 3.0), ending(5, 0, 0.1)]);
        let descriptors = build_descriptors(&features, &MatcherConfig::default());
        let rel = descriptors[0].neighbors[0].relative_angle;
        assert!((rel - (0.1 - 3.0)).abs() < 1e-12);
        let back = descriptors[1].neighbors[0].relative_angle;
        assert!((back - 2.9).abs() < 1e-12);
        assert!((-PI..PI).contains(&rel));
    }

    #[test]
    fn coincident_minutiae_are_neighbors() {
        let features = set(vec![ending(7, 7, 0.0), ending(7, 7, 0.4)]);
        let descriptors = build_descriptors(&features, &MatcherConfig::default());
        assert_eq!(descriptors[0].neighbors.len(), 1);
        assert!(descriptors[0].neighbors[0].distance.abs() < f64::EPSILON);
    }

    #[test]
    fn descriptors_are_translation_invariant() {
        let base = vec![ending(20, 20, 0.3), ending(35, 28, 1.1), ending(25, 50, 2.0)];
        let shifted: Vec<Minutia> = base.iter().map(|m| ending(m.x + 60, m.y + 15, m.angle)).collect();
        let a = build_descriptors(&set(base), &MatcherConfig::default());
        let b = build_descriptors(&set(shifted), &MatcherConfig::default());
        for (da, db) in a.iter().zip(&b) {
            assert_eq!(da.neighbors, db.neighbors);
        }
    }

    #[test]
    fn empty_set_has_no_descriptors() {
        assert!(build_descriptors(&FeatureSet::default(), &MatcherConfig::default()).is_empty());
    }
}
