//! FAST-9 segment-test corner detector with 3x3 non-maximum suppression.

use super::{mask_allows, KeyPoint};
use crate::types::GrayImage;

/// Bresenham circle of radius 3, clockwise from 12 o'clock
const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// Contiguous arc length required for a corner
const ARC: usize = 9;

#[derive(Debug, Clone)]
pub struct FastDetector {
    pub threshold: u8,
    pub nonmax_suppression: bool,
}

impl Default for FastDetector {
    fn default() -> Self {
        Self {
            threshold: 20,
            nonmax_suppression: true,
        }
    }
}

impl FastDetector {
    pub fn new(threshold: u8) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    pub fn detect(&self, image: &GrayImage, mask: Option<&GrayImage>) -> Vec<KeyPoint> {
        let (w, h) = (image.width() as usize, image.height() as usize);
        if w < 7 || h < 7 {
            return Vec::new();
        }
        let t = self.threshold as i16;
        let mut scores = vec![0u32; w * h];

        for y in 3..h - 3 {
            for x in 3..w - 3 {
                let p = image.at(x, y) as i16;
                let mut ring = [0i16; 16];
                for (i, (dx, dy)) in CIRCLE.iter().enumerate() {
                    ring[i] =
                        image.at((x as i32 + dx) as usize, (y as i32 + dy) as usize) as i16 - p;
                }
                if let Some(score) = segment_score(&ring, t) {
                    scores[y * w + x] = score;
                }
            }
        }

        let mut keypoints = Vec::new();
        for y in 3..h - 3 {
            for x in 3..w - 3 {
                let s = scores[y * w + x];
                if s == 0 || !mask_allows(mask, x as u32, y as u32) {
                    continue;
                }
                if self.nonmax_suppression && !is_local_max(&scores, w, x, y, s) {
                    continue;
                }
                keypoints.push(KeyPoint::new(x as f32, y as f32, 7.0, s as f32));
            }
        }
        keypoints
    }
}

/// Sum of absolute differences beyond the threshold, if the ring holds an
/// arc of `ARC` pixels that are all brighter or all darker than the center
fn segment_score(ring: &[i16; 16], t: i16) -> Option<u32> {
    let brighter = has_arc(ring, |d| d > t);
    let darker = has_arc(ring, |d| d < -t);
    if !brighter && !darker {
        return None;
    }
    let score = ring
        .iter()
        .map(|&d| (d.unsigned_abs() as i16 - t).max(0) as u32)
        .sum::<u32>()
        .max(1);
    Some(score)
}

fn has_arc(ring: &[i16; 16], pred: impl Fn(i16) -> bool) -> bool {
    let mut run = 0;
    // Walk the ring twice so arcs that wrap past index 15 are counted.
    for i in 0..32 {
        if pred(ring[i % 16]) {
            run += 1;
            if run >= ARC {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

fn is_local_max(scores: &[u32], w: usize, x: usize, y: usize, s: u32) -> bool {
    for ny in y - 1..=y + 1 {
        for nx in x - 1..=x + 1 {
            if (nx, ny) == (x, y) {
                continue;
            }
            let n = scores[ny * w + nx];
            // Ties break toward the earlier pixel in raster order.
            if n > s || (n == s && (ny, nx) < (y, x)) {
                return false;
            }
        }
    }
    true
}
