//! Floating-point depth to 8-bit conversion.

use crate::types::{DepthImage, GrayImage};

/// Map one depth sample to mono8. Non-finite samples become 0.
#[inline]
pub fn depth_to_mono8(depth: f32, scale: f32) -> u8 {
    let v = (depth * scale).abs();
    if v.is_finite() {
        v.round().min(255.0) as u8
    } else {
        0
    }
}

/// Converts depth images into a reused mono8 buffer.
///
/// The output doubles as the feature detection mask: zero means no usable
/// depth at that pixel.
pub struct DepthNormalizer {
    scale: f32,
    buffer: GrayImage,
    reallocations: u64,
}

impl DepthNormalizer {
    pub fn new(scale: f32) -> Self {
        Self {
            scale,
            buffer: GrayImage::new(0, 0),
            reallocations: 0,
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// How many times the output buffer had to be resized
    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }

    /// Normalize `depth` into the internal buffer and return it.
    ///
    /// The returned image is overwritten by the next call.
    pub fn normalize(&mut self, depth: &DepthImage) -> &GrayImage {
        let (w, h) = depth.dimensions();
        if self.buffer.ensure_dimensions(w, h) {
            self.reallocations += 1;
        }
        let scale = self.scale;
        for (out, &d) in self.buffer.as_mut_slice().iter_mut().zip(depth.as_slice()) {
            *out = depth_to_mono8(d, scale);
        }
        &self.buffer
    }

    /// The last normalized image
    pub fn output(&self) -> &GrayImage {
        &self.buffer
    }
}
