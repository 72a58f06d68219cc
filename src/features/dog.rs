//! Difference-of-Gaussians extrema detector (the SIFT detector).
//!
//! Gaussian levels are blurred from the octave base with separable kernels.
//! Each octave halves the previous one; extrema are kept when they beat all 26
//! neighbours, clear the contrast threshold, and are not edge-like.

use super::{mask_allows, retain_best, KeyPoint};
use crate::types::GrayImage;

#[derive(Debug, Clone)]
pub struct DogDetector {
    pub octaves: usize,
    /// DoG layers searched per octave
    pub layers: usize,
    pub sigma: f32,
    /// Minimum |DoG| in 0..255 intensity units
    pub contrast_threshold: f32,
    /// Maximum principal curvature ratio
    pub edge_threshold: f32,
    pub max_features: usize,
}

impl Default for DogDetector {
    fn default() -> Self {
        Self {
            octaves: 3,
            layers: 3,
            sigma: 1.6,
            contrast_threshold: 0.04 * 255.0 / 6.0,
            edge_threshold: 10.0,
            max_features: 1500,
        }
    }
}

struct Plane {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Plane {
    fn from_gray(image: &GrayImage) -> Self {
        Self {
            width: image.width() as usize,
            height: image.height() as usize,
            data: image.as_slice().iter().map(|&v| v as f32).collect(),
        }
    }

    #[inline]
    fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    fn downsample(&self) -> Self {
        let (width, height) = (self.width / 2, self.height / 2);
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(self.at(2 * x, 2 * y));
            }
        }
        Self { width, height, data }
    }

    /// Separable Gaussian blur with clamped edges
    fn blurred(&self, sigma: f32) -> Self {
        let kernel = gaussian_kernel(sigma);
        let mut scratch = vec![0.0; self.data.len()];
        let mut data = vec![0.0; self.data.len()];
        convolve(&self.data, &mut scratch, self.width, self.height, &kernel, true);
        convolve(&scratch, &mut data, self.width, self.height, &kernel, false);
        Self {
            width: self.width,
            height: self.height,
            data,
        }
    }
}

fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (3.0 * sigma).ceil().max(1.0) as i32;
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|i| (-(i * i) as f32 / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);
    kernel
}

/// One separable convolution pass; samples past the edge repeat the edge
fn convolve(src: &[f32], dst: &mut [f32], w: usize, h: usize, kernel: &[f32], horizontal: bool) {
    let radius = (kernel.len() / 2) as i64;
    let (outer, inner) = if horizontal { (h, w) } else { (w, h) };
    let idx = |o: usize, i: usize| if horizontal { o * w + i } else { i * w + o };
    for o in 0..outer {
        for i in 0..inner {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let j = (i as i64 + k as i64 - radius).clamp(0, inner as i64 - 1) as usize;
                acc += weight * src[idx(o, j)];
            }
            dst[idx(o, i)] = acc;
        }
    }
}

impl DogDetector {
    pub fn detect(&self, image: &GrayImage, mask: Option<&GrayImage>) -> Vec<KeyPoint> {
        let mut keypoints = Vec::new();
        let mut base = Plane::from_gray(image);
        let k = 2f32.powf(1.0 / self.layers as f32);

        for octave in 0..self.octaves {
            if base.width < 16 || base.height < 16 {
                break;
            }
            let scale = (1usize << octave) as f32;
            let gaussians: Vec<Plane> = (0..self.layers + 3)
                .map(|i| base.blurred(self.sigma * k.powi(i as i32)))
                .collect();
            let dogs: Vec<Vec<f32>> = gaussians
                .windows(2)
                .map(|pair| pair[1].data.iter().zip(&pair[0].data).map(|(a, b)| a - b).collect())
                .collect();

            let (w, h) = (base.width, base.height);
            for layer in 1..dogs.len() - 1 {
                for y in 1..h - 1 {
                    for x in 1..w - 1 {
                        let v = dogs[layer][y * w + x];
                        if v.abs() <= self.contrast_threshold {
                            continue;
                        }
                        if !is_extremum(&dogs[layer - 1..=layer + 1], w, x, y, v) {
                            continue;
                        }
                        if self.is_edge(&dogs[layer], w, x, y) {
                            continue;
                        }
                        let (fx, fy) = (x as f32 * scale, y as f32 * scale);
                        if !mask_allows(mask, fx as u32, fy as u32) {
                            continue;
                        }
                        let sigma = self.sigma * k.powi(layer as i32) * scale;
                        let mut kp = KeyPoint::new(fx, fy, 2.0 * sigma, v.abs());
                        kp.octave = octave as i32;
                        keypoints.push(kp);
                    }
                }
            }
            base = gaussians[self.layers].downsample();
        }

        retain_best(&mut keypoints, self.max_features);
        keypoints
    }

    fn is_edge(&self, dog: &[f32], w: usize, x: usize, y: usize) -> bool {
        let at = |xx: usize, yy: usize| dog[yy * w + xx];
        let v2 = 2.0 * at(x, y);
        let dxx = at(x + 1, y) + at(x - 1, y) - v2;
        let dyy = at(x, y + 1) + at(x, y - 1) - v2;
        let dxy =
            (at(x + 1, y + 1) - at(x + 1, y - 1) - at(x - 1, y + 1) + at(x - 1, y - 1)) * 0.25;
        let trace = dxx + dyy;
        let det = dxx * dyy - dxy * dxy;
        let r = self.edge_threshold;
        det <= 0.0 || trace * trace * r >= (r + 1.0) * (r + 1.0) * det
    }
}

fn is_extremum(triple: &[Vec<f32>], w: usize, x: usize, y: usize, v: f32) -> bool {
    let maximum = v > 0.0;
    for (li, layer) in triple.iter().enumerate() {
        for yy in y - 1..=y + 1 {
            for xx in x - 1..=x + 1 {
                if li == 1 && xx == x && yy == y {
                    continue;
                }
                let n = layer[yy * w + xx];
                if (maximum && n >= v) || (!maximum && n <= v) {
                    return false;
                }
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_images::blobs;

    #[test]
    fn test_convolution_preserves_constant() {
        let src = vec![5.0f32; 20];
        let mut dst = vec![0.0f32; 20];
        convolve(&src, &mut dst, 5, 4, &gaussian_kernel(1.6), true);
        assert!(dst.iter().all(|&v| (v - 5.0).abs() < 1e-4));
    }

    #[test]
    fn test_finds_blob_centers() {
        let img = blobs(80, 80, &[(25.0, 25.0), (55.0, 50.0)], 4.0);
        let kps = DogDetector::default().detect(&img, None);
        for center in [(25.0f32, 25.0f32), (55.0, 50.0)] {
            assert!(
                kps.iter()
                    .any(|k| (k.x - center.0).abs() <= 3.0 && (k.y - center.1).abs() <= 3.0),
                "no keypoint near {:?}",
                center
            );
        }
    }

    #[test]
    fn test_flat_image_has_no_extrema() {
        let img = GrayImage::filled(64, 64, 128);
        assert!(DogDetector::default().detect(&img, None).is_empty());
    }
}
