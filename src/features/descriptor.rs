//! Descriptor extractors: upright SURF (64 floats), SIFT (128 floats) and
//! BRIEF (32 bytes).

use super::integral::IntegralImage;
use super::{Descriptors, KeyPoint};
use crate::types::GrayImage;

// ==================== SURF ====================

/// Upright SURF: Haar wavelet sums over a 4x4 grid, no orientation
#[derive(Debug, Clone, Default)]
pub struct SurfExtractor;

impl SurfExtractor {
    pub const DIM: usize = 64;

    pub fn describe(&self, image: &GrayImage, keypoints: &mut Vec<KeyPoint>) -> Descriptors {
        let ii = IntegralImage::new(image);
        let mut data = Vec::with_capacity(keypoints.len() * Self::DIM);
        for kp in keypoints.iter() {
            let start = data.len();
            // Keypoint sizes are filter sizes; 9 maps to scale 1.2.
            let scale = (1.2 * kp.size / 9.0).max(1.0);
            let (cx, cy) = (kp.x, kp.y);
            let haar = (2.0 * scale).round().max(2.0) as i64;
            for i in 0..4 {
                for j in 0..4 {
                    let (mut dx, mut dy, mut adx, mut ady) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);
                    for k in 0..5 {
                        for l in 0..5 {
                            let sx = cx + (-10.0 + (i * 5 + k) as f32 + 0.5) * scale;
                            let sy = cy + (-10.0 + (j * 5 + l) as f32 + 0.5) * scale;
                            let (rx, ry) =
                                haar_response(&ii, sx.round() as i64, sy.round() as i64, haar);
                            // Gaussian weighting centred on the keypoint (sigma = 3.3 s)
                            let (ox, oy) = ((sx - cx) / scale, (sy - cy) / scale);
                            let g = (-(ox * ox + oy * oy) / (2.0 * 3.3 * 3.3)).exp();
                            dx += g * rx;
                            dy += g * ry;
                            adx += g * rx.abs();
                            ady += g * ry.abs();
                        }
                    }
                    data.extend_from_slice(&[dx, dy, adx, ady]);
                }
            }
            normalize(&mut data[start..]);
        }
        Descriptors::Float {
            dim: Self::DIM,
            data,
        }
    }
}

/// Haar wavelet responses (x, y) of side `size` centred at (x, y)
fn haar_response(ii: &IntegralImage, x: i64, y: i64, size: i64) -> (f32, f32) {
    let half = size / 2;
    let rx = ii.box_sum(x, y - half, half, size) - ii.box_sum(x - half, y - half, half, size);
    let ry = ii.box_sum(x - half, y, size, half) - ii.box_sum(x - half, y - half, size, half);
    (rx as f32, ry as f32)
}

fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

// ==================== SIFT ====================

/// 4x4 cells of 8-bin gradient orientation histograms over a 16x16 window
#[derive(Debug, Clone, Default)]
pub struct SiftExtractor;

impl SiftExtractor {
    pub const DIM: usize = 128;
    const CELLS: usize = 4;
    const BINS: usize = 8;

    pub fn describe(&self, image: &GrayImage, keypoints: &mut Vec<KeyPoint>) -> Descriptors {
        let (w, h) = (image.width() as f32, image.height() as f32);
        keypoints.retain(|kp| {
            let r = Self::half_window(kp) + 1.0;
            kp.x - r >= 0.0 && kp.y - r >= 0.0 && kp.x + r < w && kp.y + r < h
        });

        let mut data = Vec::with_capacity(keypoints.len() * Self::DIM);
        for kp in keypoints.iter() {
            let mut hist = [0.0f32; Self::DIM];
            let half = Self::half_window(kp);
            let step = half / 8.0;
            for sy in 0..16 {
                for sx in 0..16 {
                    let px = (kp.x - half + (sx as f32 + 0.5) * step).round() as u32;
                    let py = (kp.y - half + (sy as f32 + 0.5) * step).round() as u32;
                    let (Some(l), Some(r), Some(u), Some(d)) = (
                        image.get(px.saturating_sub(1), py),
                        image.get(px + 1, py),
                        image.get(px, py.saturating_sub(1)),
                        image.get(px, py + 1),
                    ) else {
                        continue;
                    };
                    let gx = r as f32 - l as f32;
                    let gy = d as f32 - u as f32;
                    let magnitude = (gx * gx + gy * gy).sqrt();
                    let angle = gy.atan2(gx).rem_euclid(std::f32::consts::TAU);
                    let bin = ((angle / std::f32::consts::TAU * Self::BINS as f32) as usize)
                        % Self::BINS;
                    let (ox, oy) = (sx as f32 - 7.5, sy as f32 - 7.5);
                    let weight = (-(ox * ox + oy * oy) / (2.0 * 8.0 * 8.0)).exp();
                    let cell = (sy / 4) * Self::CELLS + sx / 4;
                    hist[cell * Self::BINS + bin] += weight * magnitude;
                }
            }
            normalize(&mut hist);
            hist.iter_mut().for_each(|v| *v = v.min(0.2));
            normalize(&mut hist);
            data.extend_from_slice(&hist);
        }
        Descriptors::Float {
            dim: Self::DIM,
            data,
        }
    }

    fn half_window(kp: &KeyPoint) -> f32 {
        (kp.size * 1.5).max(8.0)
    }
}

// ==================== BRIEF ====================

const BRIEF_BYTES: usize = 32;
const BRIEF_PATCH: i32 = 48;
const BRIEF_KERNEL_HALF: i64 = 4;

/// Binary intensity tests between smoothed point pairs in a 48x48 patch
#[derive(Debug, Clone)]
pub struct BriefExtractor {
    pairs: Vec<((i32, i32), (i32, i32))>,
}

impl Default for BriefExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl BriefExtractor {
    pub fn new() -> Self {
        // Fixed seed so descriptors are comparable across runs.
        let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };
        let span = BRIEF_PATCH / 2 - BRIEF_KERNEL_HALF as i32;
        let mut coord = move || (next() % (2 * span as u64 + 1)) as i32 - span;
        let pairs = (0..BRIEF_BYTES * 8)
            .map(|_| ((coord(), coord()), (coord(), coord())))
            .collect();
        Self { pairs }
    }

    pub fn describe(&self, image: &GrayImage, keypoints: &mut Vec<KeyPoint>) -> Descriptors {
        let border = (BRIEF_PATCH / 2) as f32 + BRIEF_KERNEL_HALF as f32;
        let (w, h) = (image.width() as f32, image.height() as f32);
        keypoints.retain(|kp| {
            kp.x >= border && kp.y >= border && kp.x < w - border && kp.y < h - border
        });

        let ii = IntegralImage::new(image);
        let mut data = Vec::with_capacity(keypoints.len() * BRIEF_BYTES);
        for kp in keypoints.iter() {
            let (cx, cy) = (kp.x.round() as i64, kp.y.round() as i64);
            let smoothed = |(dx, dy): (i32, i32)| {
                ii.centered_mean(cx + dx as i64, cy + dy as i64, BRIEF_KERNEL_HALF)
            };
            for byte in 0..BRIEF_BYTES {
                let mut value = 0u8;
                for bit in 0..8 {
                    let (p, q) = self.pairs[byte * 8 + bit];
                    if smoothed(p) < smoothed(q) {
                        value |= 1 << (7 - bit);
                    }
                }
                data.push(value);
            }
        }
        Descriptors::Binary {
            bytes: BRIEF_BYTES,
            data,
        }
    }
}
