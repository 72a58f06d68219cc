//! Fast-Hessian blob detector (the SURF detector).
//!
//! Determinant-of-Hessian responses are computed with box filters on an
//! integral image for a fixed ladder of filter sizes. A keypoint is a
//! 3x3x3 maximum across space and adjacent filter sizes whose response
//! exceeds `threshold`.

use super::integral::IntegralImage;
use super::{mask_allows, KeyPoint};
use crate::types::GrayImage;

/// Filter side lengths, one response layer each
const FILTER_SIZES: [usize; 6] = [9, 15, 21, 27, 39, 51];

/// Relative weight of the Dxy term in the determinant
const DXY_WEIGHT: f64 = 0.81;

#[derive(Debug, Clone)]
pub struct HessianDetector {
    pub threshold: f64,
    /// Pixel step between sampled responses
    pub sample_step: usize,
}

impl Default for HessianDetector {
    fn default() -> Self {
        Self {
            threshold: 400.0,
            sample_step: 1,
        }
    }
}

impl HessianDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    pub fn detect(&self, image: &GrayImage, mask: Option<&GrayImage>) -> Vec<KeyPoint> {
        let integral = IntegralImage::new(image);
        let (w, h) = (integral.width(), integral.height());
        let step = self.sample_step.max(1);
        let (cols, rows) = (w.div_ceil(step), h.div_ceil(step));

        let layers: Vec<Vec<f64>> = FILTER_SIZES
            .iter()
            .map(|&size| response_layer(&integral, size, step, cols, rows))
            .collect();

        let mut keypoints = Vec::new();
        for li in 1..FILTER_SIZES.len() - 1 {
            // Only sample where the largest filter of the triple fits.
            let border = FILTER_SIZES[li + 1] / 2 + 1;
            let b = border.div_ceil(step);
            if cols <= 2 * b || rows <= 2 * b {
                continue;
            }
            for r in b..rows - b {
                for c in b..cols - b {
                    let v = layers[li][r * cols + c];
                    if v <= self.threshold {
                        continue;
                    }
                    if !is_scale_space_max(&layers[li - 1..=li + 1], cols, c, r, v) {
                        continue;
                    }
                    let (x, y) = ((c * step) as u32, (r * step) as u32);
                    if !mask_allows(mask, x, y) {
                        continue;
                    }
                    let mut kp =
                        KeyPoint::new(x as f32, y as f32, FILTER_SIZES[li] as f32, v as f32);
                    kp.octave = li as i32;
                    keypoints.push(kp);
                }
            }
        }
        keypoints
    }
}

fn response_layer(
    ii: &IntegralImage,
    size: usize,
    step: usize,
    cols: usize,
    rows: usize,
) -> Vec<f64> {
    let mut out = vec![0.0; cols * rows];
    let lobe = (size / 3) as i64;
    let b = ((size - 1) / 2) as i64;
    let w = size as i64;
    let inv_area = 1.0 / (w * w) as f64;

    for r in 0..rows {
        for c in 0..cols {
            let (x, y) = ((c * step) as i64, (r * step) as i64);
            let dxx = ii.box_sum(x - b, y - lobe + 1, w, 2 * lobe - 1)
                - 3.0 * ii.box_sum(x - lobe / 2, y - lobe + 1, lobe, 2 * lobe - 1);
            let dyy = ii.box_sum(x - lobe + 1, y - b, 2 * lobe - 1, w)
                - 3.0 * ii.box_sum(x - lobe + 1, y - lobe / 2, 2 * lobe - 1, lobe);
            let dxy = ii.box_sum(x + 1, y - lobe, lobe, lobe)
                + ii.box_sum(x - lobe, y + 1, lobe, lobe)
                - ii.box_sum(x - lobe, y - lobe, lobe, lobe)
                - ii.box_sum(x + 1, y + 1, lobe, lobe);
            let (dxx, dyy, dxy) = (dxx * inv_area, dyy * inv_area, dxy * inv_area);
            out[r * cols + c] = dxx * dyy - DXY_WEIGHT * dxy * dxy;
        }
    }
    out
}

fn is_scale_space_max(triple: &[Vec<f64>], cols: usize, c: usize, r: usize, v: f64) -> bool {
    for (li, layer) in triple.iter().enumerate() {
        for rr in r - 1..=r + 1 {
            for cc in c - 1..=c + 1 {
                if li == 1 && rr == r && cc == c {
                    continue;
                }
                if layer[rr * cols + cc] >= v {
                    return false;
                }
            }
        }
    }
    true
}
