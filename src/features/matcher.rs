//! Brute-force descriptor matching.

use super::Descriptors;

/// One query row matched to its nearest train row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureMatch {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: f32,
}

/// Exhaustive nearest-neighbour matcher.
///
/// Float descriptors are compared with L2 distance, binary ones with
/// Hamming distance. With `cross_check`, a match is kept only when the
/// query row is also the nearest neighbour of its train row.
#[derive(Debug, Clone, Default)]
pub struct BruteForceMatcher {
    pub cross_check: bool,
}

impl BruteForceMatcher {
    pub fn new(cross_check: bool) -> Self {
        Self { cross_check }
    }

    /// Match every query row against `train`.
    ///
    /// Returns no matches when the two sets are of different kinds or widths.
    pub fn match_descriptors(&self, query: &Descriptors, train: &Descriptors) -> Vec<FeatureMatch> {
        if !compatible(query, train) {
            tracing::debug!("Refusing to match incompatible descriptor sets");
            return Vec::new();
        }
        let forward = nearest(query, train);
        if !self.cross_check {
            return forward;
        }
        let backward = nearest(train, query);
        forward
            .into_iter()
            .filter(|m| backward.get(m.train_idx).is_some_and(|b| b.train_idx == m.query_idx))
            .collect()
    }
}

fn compatible(a: &Descriptors, b: &Descriptors) -> bool {
    match (a, b) {
        (Descriptors::Float { dim: da, .. }, Descriptors::Float { dim: db, .. }) => da == db,
        (Descriptors::Binary { bytes: ba, .. }, Descriptors::Binary { bytes: bb, .. }) => ba == bb,
        _ => false,
    }
}

fn nearest(query: &Descriptors, train: &Descriptors) -> Vec<FeatureMatch> {
    (0..query.len())
        .filter_map(|qi| {
            (0..train.len())
                .map(|ti| (ti, distance(query, qi, train, ti)))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(ti, d)| FeatureMatch {
                    query_idx: qi,
                    train_idx: ti,
                    distance: d,
                })
        })
        .collect()
}

fn distance(a: &Descriptors, ai: usize, b: &Descriptors, bi: usize) -> f32 {
    match (a.float_row(ai), b.float_row(bi)) {
        (Some(x), Some(y)) => x.iter().zip(y).map(|(p, q)| (p - q) * (p - q)).sum::<f32>().sqrt(),
        _ => match (a.binary_row(ai), b.binary_row(bi)) {
            (Some(x), Some(y)) => {
                x.iter().zip(y).map(|(p, q)| (p ^ q).count_ones()).sum::<u32>() as f32
            }
            _ => f32::INFINITY,
        },
    }
}
