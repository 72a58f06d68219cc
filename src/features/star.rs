//! Center-surround extrema detector (STAR / CenSurE).
//!
//! At each pixel the response is the mean of an inner square minus the mean
//! of the surrounding ring, evaluated for several radii; the radius with the
//! largest magnitude wins. Keypoints are spatial maxima of |response| above
//! `response_threshold`.

use super::integral::IntegralImage;
use super::{mask_allows, KeyPoint};
use crate::types::GrayImage;

/// Inner half-sizes; the outer square is twice as large
const RADII: [i64; 7] = [1, 2, 3, 4, 6, 8, 11];

#[derive(Debug, Clone)]
pub struct StarDetector {
    pub response_threshold: f64,
    /// Half-width of the non-maximum suppression window
    pub suppress_radius: usize,
}

impl Default for StarDetector {
    fn default() -> Self {
        Self {
            response_threshold: 30.0,
            suppress_radius: 2,
        }
    }
}

impl StarDetector {
    pub fn detect(&self, image: &GrayImage, mask: Option<&GrayImage>) -> Vec<KeyPoint> {
        let ii = IntegralImage::new(image);
        let (w, h) = (ii.width(), ii.height());
        let border = (2 * RADII[RADII.len() - 1] + 1) as usize;
        if w <= 2 * border || h <= 2 * border {
            return Vec::new();
        }

        let mut response = vec![0.0f64; w * h];
        let mut best_radius = vec![0i64; w * h];
        for y in border..h - border {
            for x in border..w - border {
                let (cx, cy) = (x as i64, y as i64);
                let mut best = 0.0f64;
                for &r in &RADII {
                    let inner_side = 2 * r + 1;
                    let outer_side = 4 * r + 1;
                    let inner = ii.box_sum(cx - r, cy - r, inner_side, inner_side);
                    let outer = ii.box_sum(cx - 2 * r, cy - 2 * r, outer_side, outer_side);
                    let inner_area = (inner_side * inner_side) as f64;
                    let ring_area = (outer_side * outer_side) as f64 - inner_area;
                    let v = inner / inner_area - (outer - inner) / ring_area;
                    if v.abs() > best.abs() {
                        best = v;
                        best_radius[y * w + x] = r;
                    }
                }
                response[y * w + x] = best;
            }
        }

        let s = self.suppress_radius;
        let mut keypoints = Vec::new();
        for y in border..h - border {
            for x in border..w - border {
                let v = response[y * w + x].abs();
                if v <= self.response_threshold || !mask_allows(mask, x as u32, y as u32) {
                    continue;
                }
                let dominated = (y - s..=y + s).any(|ny| {
                    (x - s..=x + s).any(|nx| {
                        let n = response[ny * w + nx].abs();
                        (nx, ny) != (x, y) && (n > v || (n == v && (ny, nx) < (y, x)))
                    })
                });
                if dominated {
                    continue;
                }
                let size = (4 * best_radius[y * w + x] + 1) as f32;
                keypoints.push(KeyPoint::new(x as f32, y as f32, size, v as f32));
            }
        }
        keypoints
    }
}
