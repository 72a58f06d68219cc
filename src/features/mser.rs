//! Maximally stable extremal regions.
//!
//! Pixels are added in intensity order into a union-find forest; every
//! `delta` levels the live components are sampled. A component sampled at
//! level `g` is stable when its area changed by less than `max_variation`
//! between `g - delta` and `g + delta`. Dark regions come from the image,
//! bright regions from its inverse. Each region yields one keypoint at its
//! centroid with the diameter of a disc of equal area.

use super::{mask_allows, KeyPoint};
use crate::types::GrayImage;

#[derive(Debug, Clone)]
pub struct MserDetector {
    pub delta: u8,
    pub min_area: usize,
    pub max_area: usize,
    pub max_variation: f64,
}

impl Default for MserDetector {
    fn default() -> Self {
        Self {
            delta: 5,
            min_area: 60,
            max_area: 14400,
            max_variation: 0.25,
        }
    }
}

/// Region sampled at one level, waiting for its `g + delta` area
struct Candidate {
    root: usize,
    area: usize,
    prev_area: usize,
    sum_x: u64,
    sum_y: u64,
}

struct Forest {
    parent: Vec<usize>,
    area: Vec<usize>,
    sum_x: Vec<u64>,
    sum_y: Vec<u64>,
    /// Area of each root at the previous sample, if it was large enough to track
    last_area: Vec<usize>,
    active: Vec<bool>,
}

impl Forest {
    fn new(n: usize, width: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            area: vec![1; n],
            sum_x: (0..n).map(|i| (i % width) as u64).collect(),
            sum_y: (0..n).map(|i| (i / width) as u64).collect(),
            last_area: vec![0; n],
            active: vec![false; n],
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    /// Union by area; the larger component keeps its history
    fn union(&mut self, a: usize, b: usize) {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        if self.area[ra] < self.area[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.area[ra] += self.area[rb];
        self.sum_x[ra] += self.sum_x[rb];
        self.sum_y[ra] += self.sum_y[rb];
    }
}

impl MserDetector {
    pub fn detect(&self, image: &GrayImage, mask: Option<&GrayImage>) -> Vec<KeyPoint> {
        let mut keypoints = self.detect_dark(image.as_slice(), image.width() as usize, mask);
        let inverted: Vec<u8> = image.as_slice().iter().map(|&v| 255 - v).collect();
        keypoints.extend(self.detect_dark(&inverted, image.width() as usize, mask));
        dedupe(&mut keypoints);
        keypoints
    }

    fn detect_dark(&self, pixels: &[u8], width: usize, mask: Option<&GrayImage>) -> Vec<KeyPoint> {
        let n = pixels.len();
        if n == 0 || width == 0 {
            return Vec::new();
        }
        let height = n / width;

        // Counting sort of pixel indices by intensity.
        let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); 256];
        for (i, &v) in pixels.iter().enumerate() {
            buckets[v as usize].push(i);
        }

        let mut forest = Forest::new(n, width);
        let mut pending: Vec<Candidate> = Vec::new();
        let mut keypoints = Vec::new();
        let delta = self.delta.max(1) as usize;

        for (level, bucket) in buckets.iter().enumerate() {
            for &i in bucket {
                forest.active[i] = true;
                let (x, y) = (i % width, i / width);
                let neighbours = [
                    (x > 0).then(|| i - 1),
                    (x + 1 < width).then(|| i + 1),
                    (y > 0).then(|| i - width),
                    (y + 1 < height).then(|| i + width),
                ];
                for j in neighbours.into_iter().flatten() {
                    if forest.active[j] {
                        forest.union(i, j);
                    }
                }
            }

            if level % delta != 0 {
                continue;
            }

            // Candidates from the previous sample now know their next area.
            for c in pending.drain(..) {
                let root = forest.find(c.root);
                let next_area = forest.area[root];
                let variation = (next_area - c.prev_area) as f64 / c.area as f64;
                if variation < self.max_variation {
                    let cx = c.sum_x as f32 / c.area as f32;
                    let cy = c.sum_y as f32 / c.area as f32;
                    if mask_allows(mask, cx.round() as u32, cy.round() as u32) {
                        let diameter = 2.0 * (c.area as f32 / std::f32::consts::PI).sqrt();
                        keypoints.push(KeyPoint::new(cx, cy, diameter, (1.0 - variation) as f32));
                    }
                }
            }

            let mut roots: Vec<usize> = Vec::new();
            for i in 0..n {
                if forest.active[i] && forest.parent[i] == i {
                    roots.push(i);
                }
            }
            for root in roots {
                let area = forest.area[root];
                if (self.min_area..=self.max_area).contains(&area) {
                    pending.push(Candidate {
                        root,
                        area,
                        prev_area: forest.last_area[root],
                        sum_x: forest.sum_x[root],
                        sum_y: forest.sum_y[root],
                    });
                }
                forest.last_area[root] = area;
            }
        }
        keypoints
    }
}

/// Drop regions that repeat an already kept region at nearly the same place and size
fn dedupe(keypoints: &mut Vec<KeyPoint>) {
    keypoints.sort_by(|a, b| b.response.total_cmp(&a.response));
    let mut kept: Vec<KeyPoint> = Vec::with_capacity(keypoints.len());
    for kp in keypoints.drain(..) {
        let duplicate = kept.iter().any(|k| {
            (k.x - kp.x).abs() < 2.0
                && (k.y - kp.y).abs() < 2.0
                && (k.size - kp.size).abs() <= 0.2 * k.size.max(kp.size)
        });
        if !duplicate {
            kept.push(kp);
        }
    }
    *keypoints = kept;
}
