//! Good-features-to-track corner detector (Shi-Tomasi minimum eigenvalue).

use super::{mask_allows, KeyPoint};
use crate::types::GrayImage;

#[derive(Debug, Clone)]
pub struct CornerDetector {
    pub max_corners: usize,
    /// Fraction of the strongest response a corner must reach
    pub quality_level: f32,
    pub min_distance: f32,
    /// Side of the structure tensor averaging window
    pub block_size: usize,
}

impl Default for CornerDetector {
    fn default() -> Self {
        Self {
            max_corners: 1000,
            quality_level: 0.01,
            min_distance: 1.0,
            block_size: 3,
        }
    }
}

impl CornerDetector {
    pub fn detect(&self, image: &GrayImage, mask: Option<&GrayImage>) -> Vec<KeyPoint> {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let half = self.block_size.max(1) / 2;
        let margin = half + 1;
        if w <= 2 * margin + 2 || h <= 2 * margin + 2 {
            return Vec::new();
        }

        // Sobel gradients
        let mut gx = vec![0.0f32; w * h];
        let mut gy = vec![0.0f32; w * h];
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let p = |dx: isize, dy: isize| {
                    image.at((x as isize + dx) as usize, (y as isize + dy) as usize) as f32
                };
                gx[y * w + x] = (p(1, -1) + 2.0 * p(1, 0) + p(1, 1))
                    - (p(-1, -1) + 2.0 * p(-1, 0) + p(-1, 1));
                gy[y * w + x] = (p(-1, 1) + 2.0 * p(0, 1) + p(1, 1))
                    - (p(-1, -1) + 2.0 * p(0, -1) + p(1, -1));
            }
        }

        let mut eig = vec![0.0f32; w * h];
        let mut max_eig = 0.0f32;
        for y in margin..h - margin {
            for x in margin..w - margin {
                let (mut a, mut b, mut c) = (0.0f32, 0.0f32, 0.0f32);
                for yy in y - half..=y + half {
                    for xx in x - half..=x + half {
                        let (dx, dy) = (gx[yy * w + xx], gy[yy * w + xx]);
                        a += dx * dx;
                        b += dx * dy;
                        c += dy * dy;
                    }
                }
                let min_eig = 0.5 * ((a + c) - ((a - c) * (a - c) + 4.0 * b * b).sqrt());
                eig[y * w + x] = min_eig;
                max_eig = max_eig.max(min_eig);
            }
        }
        if max_eig <= 0.0 {
            return Vec::new();
        }

        let threshold = max_eig * self.quality_level;
        let mut candidates = Vec::new();
        for y in margin + 1..h - margin - 1 {
            for x in margin + 1..w - margin - 1 {
                let v = eig[y * w + x];
                if v <= threshold || !mask_allows(mask, x as u32, y as u32) {
                    continue;
                }
                let local_max = (y - 1..=y + 1)
                    .all(|ny| (x - 1..=x + 1).all(|nx| eig[ny * w + nx] <= v));
                if local_max {
                    candidates.push(KeyPoint::new(x as f32, y as f32, self.block_size as f32, v));
                }
            }
        }
        candidates.sort_by(|a, b| b.response.total_cmp(&a.response));

        let min_d2 = self.min_distance * self.min_distance;
        let mut corners: Vec<KeyPoint> = Vec::new();
        for kp in candidates {
            if corners.len() >= self.max_corners {
                break;
            }
            let crowded = corners.iter().any(|c| {
                let (dx, dy) = (c.x - kp.x, c.y - kp.y);
                dx * dx + dy * dy < min_d2
            });
            if !crowded {
                corners.push(kp);
            }
        }
        corners
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_images::checkerboard;

    #[test]
    fn test_checkerboard_corners() {
        let img = checkerboard(64, 64, 16);
        let kps = CornerDetector::default().detect(&img, None);
        assert!(!kps.is_empty());
        for kp in &kps {
            let near = |v: f32| ((v / 16.0).round() * 16.0 - v).abs() <= 2.0;
            assert!(near(kp.x) && near(kp.y), "corner off-grid at {:?}", kp);
        }
    }

    #[test]
    fn test_respects_max_corners_and_distance() {
        let img = checkerboard(96, 96, 8);
        let detector = CornerDetector {
            max_corners: 5,
            min_distance: 10.0,
            ..CornerDetector::default()
        };
        let kps = detector.detect(&img, None);
        assert!(kps.len() <= 5);
        for (i, a) in kps.iter().enumerate() {
            for b in &kps[i + 1..] {
                assert!(((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt() >= 10.0);
            }
        }
    }
}
