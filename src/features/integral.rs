//! Summed-area table used by the box-filter based detectors and SURF.

use crate::types::GrayImage;

/// Integral image with a zero row and column in front
#[derive(Debug, Clone)]
pub struct IntegralImage {
    width: usize,
    height: usize,
    sums: Vec<f64>,
}

impl IntegralImage {
    pub fn new(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sums = vec![0.0f64; stride * (h + 1)];
        let pixels = image.as_slice();
        for y in 0..h {
            let mut row = 0.0f64;
            for x in 0..w {
                row += pixels[y * w + x] as f64;
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
            }
        }
        Self {
            width: w,
            height: h,
            sums,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    fn at(&self, x: usize, y: usize) -> f64 {
        self.sums[y * (self.width + 1) + x]
    }

    /// Sum over the `w`×`h` box whose top-left corner is (x, y).
    ///
    /// The box is clipped to the image, so boxes hanging off an edge only
    /// count the pixels that exist.
    #[inline]
    pub fn box_sum(&self, x: i64, y: i64, w: i64, h: i64) -> f64 {
        let x0 = x.clamp(0, self.width as i64) as usize;
        let y0 = y.clamp(0, self.height as i64) as usize;
        let x1 = (x + w).clamp(0, self.width as i64) as usize;
        let y1 = (y + h).clamp(0, self.height as i64) as usize;
        if x1 <= x0 || y1 <= y0 {
            return 0.0;
        }
        self.at(x1, y1) - self.at(x0, y1) - self.at(x1, y0) + self.at(x0, y0)
    }

    /// Mean over a box centered on (cx, cy) with the given half-size
    #[inline]
    pub fn centered_mean(&self, cx: i64, cy: i64, half: i64) -> f64 {
        let side = 2 * half + 1;
        self.box_sum(cx - half, cy - half, side, side) / (side * side) as f64
    }
}
