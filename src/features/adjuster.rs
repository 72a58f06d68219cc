//! Dynamic threshold adjustment for FAST and SURF.
//!
//! `DynamicAdaptedDetector` re-runs its wrapped detector, nudging the
//! threshold up or down, until the keypoint count lands inside
//! `[min_keypoints, max_keypoints]`, the iteration budget runs out, or the
//! threshold reaches its limit. The threshold reached on one frame is kept
//! as the starting point for the next.

use super::{FastDetector, HessianDetector, KeyPoint};
use crate::types::GrayImage;

/// A detector whose sensitivity can be stepped.
pub trait AdjusterAdapter: Send {
    fn detect(&self, image: &GrayImage, mask: Option<&GrayImage>) -> Vec<KeyPoint>;

    /// Make the detector more permissive
    fn too_few(&mut self, min: usize, found: usize);

    /// Make the detector stricter
    fn too_many(&mut self, max: usize, found: usize);

    /// Whether the threshold is still inside its usable range
    fn good(&self) -> bool;
}

/// FAST threshold stepped by one intensity level
#[derive(Debug, Clone)]
pub struct FastAdjuster {
    detector: FastDetector,
    min_threshold: u8,
    max_threshold: u8,
}

impl FastAdjuster {
    pub fn new(initial: u8, min_threshold: u8, max_threshold: u8) -> Self {
        Self {
            detector: FastDetector::new(initial),
            min_threshold,
            max_threshold,
        }
    }

    pub fn threshold(&self) -> u8 {
        self.detector.threshold
    }
}

impl Default for FastAdjuster {
    fn default() -> Self {
        Self::new(20, 1, 200)
    }
}

impl AdjusterAdapter for FastAdjuster {
    fn detect(&self, image: &GrayImage, mask: Option<&GrayImage>) -> Vec<KeyPoint> {
        self.detector.detect(image, mask)
    }

    fn too_few(&mut self, _min: usize, _found: usize) {
        self.detector.threshold = self.detector.threshold.saturating_sub(1);
    }

    fn too_many(&mut self, _max: usize, _found: usize) {
        self.detector.threshold = self.detector.threshold.saturating_add(1);
    }

    fn good(&self) -> bool {
        self.detector.threshold > self.min_threshold && self.detector.threshold < self.max_threshold
    }
}

/// SURF Hessian threshold scaled by a constant factor
#[derive(Debug, Clone)]
pub struct SurfAdjuster {
    detector: HessianDetector,
    factor: f64,
    min_threshold: f64,
    max_threshold: f64,
}

impl SurfAdjuster {
    pub fn new(initial: f64, min_threshold: f64, max_threshold: f64) -> Self {
        Self {
            detector: HessianDetector::new(initial),
            factor: 1.1,
            min_threshold,
            max_threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.detector.threshold
    }
}

impl Default for SurfAdjuster {
    fn default() -> Self {
        Self::new(400.0, 2.0, 1000.0)
    }
}

impl AdjusterAdapter for SurfAdjuster {
    fn detect(&self, image: &GrayImage, mask: Option<&GrayImage>) -> Vec<KeyPoint> {
        self.detector.detect(image, mask)
    }

    fn too_few(&mut self, _min: usize, _found: usize) {
        self.detector.threshold /= self.factor;
        if self.detector.threshold < self.min_threshold {
            self.detector.threshold = self.min_threshold;
        }
    }

    fn too_many(&mut self, _max: usize, _found: usize) {
        self.detector.threshold *= self.factor;
        if self.detector.threshold > self.max_threshold {
            self.detector.threshold = self.max_threshold;
        }
    }

    fn good(&self) -> bool {
        self.detector.threshold > self.min_threshold && self.detector.threshold < self.max_threshold
    }
}

/// Wraps an [`AdjusterAdapter`] and iterates toward a keypoint count window
#[derive(Debug, Clone)]
pub struct DynamicAdaptedDetector<A> {
    adjuster: A,
    min_keypoints: usize,
    max_keypoints: usize,
    max_iterations: usize,
}

impl<A: AdjusterAdapter> DynamicAdaptedDetector<A> {
    pub fn new(
        adjuster: A,
        min_keypoints: usize,
        max_keypoints: usize,
        max_iterations: usize,
    ) -> Self {
        Self {
            adjuster,
            min_keypoints,
            max_keypoints,
            max_iterations: max_iterations.max(1),
        }
    }

    pub fn adjuster(&self) -> &A {
        &self.adjuster
    }

    pub fn detect(&mut self, image: &GrayImage, mask: Option<&GrayImage>) -> Vec<KeyPoint> {
        let mut went_down = false;
        let mut went_up = false;
        let mut keypoints = Vec::new();

        for iteration in 0..self.max_iterations {
            // Stop once the threshold has oscillated or hit its limit.
            if (went_down && went_up) || (iteration > 0 && !self.adjuster.good()) {
                break;
            }
            keypoints = self.adjuster.detect(image, mask);
            let found = keypoints.len();
            if found < self.min_keypoints {
                went_down = true;
                self.adjuster.too_few(self.min_keypoints, found);
            } else if found > self.max_keypoints {
                went_up = true;
                self.adjuster.too_many(self.max_keypoints, found);
            } else {
                break;
            }
        }
        tracing::trace!(
            "Adaptive detector settled on {} keypoints (window {}..={})",
            keypoints.len(),
            self.min_keypoints,
            self.max_keypoints
        );
        keypoints
    }
}
