//! Visual feature strategies.
//!
//! Two-layer design, same as the rest of the pipeline:
//! - **`FeatureDetector` / `DescriptorExtractor` traits** for plugin strategies
//!   registered at runtime.
//! - **`BuiltinDetector` / `BuiltinExtractor` enums** for the shipped strategies,
//!   dispatched with a `match` on the hot path.
//!
//! `AnyDetector` / `AnyExtractor` wrap either layer so the node builder can
//! treat them uniformly. Strategies are looked up by name through
//! [`registry::StrategyRegistry`].

pub mod adjuster;
pub mod corner;
pub mod descriptor;
pub mod dog;
pub mod fast;
pub mod hessian;
pub mod integral;
pub mod matcher;
pub mod mser;
pub mod registry;
pub mod star;

use crate::types::GrayImage;

pub use adjuster::{AdjusterAdapter, DynamicAdaptedDetector, FastAdjuster, SurfAdjuster};
pub use corner::CornerDetector;
pub use descriptor::{BriefExtractor, SiftExtractor, SurfExtractor};
pub use dog::DogDetector;
pub use fast::FastDetector;
pub use hessian::HessianDetector;
pub use matcher::{BruteForceMatcher, FeatureMatch};
pub use mser::MserDetector;
pub use registry::{AdjusterLimits, FeatureStrategyProvider, StrategyRegistry};
pub use star::StarDetector;

/// A detected interest point in image coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPoint {
    pub x: f32,
    pub y: f32,
    /// Diameter of the meaningful neighbourhood
    pub size: f32,
    /// Orientation in degrees, -1 when not computed
    pub angle: f32,
    /// Detector response; larger is stronger
    pub response: f32,
    pub octave: i32,
}

impl KeyPoint {
    pub fn new(x: f32, y: f32, size: f32, response: f32) -> Self {
        Self {
            x,
            y,
            size,
            angle: -1.0,
            response,
            octave: 0,
        }
    }

    /// Nearest integer pixel, clamped at zero
    pub fn pixel(&self) -> (u32, u32) {
        (self.x.round().max(0.0) as u32, self.y.round().max(0.0) as u32)
    }
}

/// Row-major descriptor matrix, one row per keypoint
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptors {
    /// Real-valued descriptors compared with L2 distance
    Float { dim: usize, data: Vec<f32> },
    /// Bit-string descriptors compared with Hamming distance
    Binary { bytes: usize, data: Vec<u8> },
}

impl Descriptors {
    /// Number of rows
    pub fn len(&self) -> usize {
        match self {
            Descriptors::Float { dim, data } => data.len().checked_div(*dim).unwrap_or(0),
            Descriptors::Binary { bytes, data } => data.len().checked_div(*bytes).unwrap_or(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row length in elements (floats or bytes)
    pub fn width(&self) -> usize {
        match self {
            Descriptors::Float { dim, .. } => *dim,
            Descriptors::Binary { bytes, .. } => *bytes,
        }
    }

    pub fn float_row(&self, i: usize) -> Option<&[f32]> {
        match self {
            Descriptors::Float { dim, data } => data.get(i * dim..(i + 1) * dim),
            Descriptors::Binary { .. } => None,
        }
    }

    pub fn binary_row(&self, i: usize) -> Option<&[u8]> {
        match self {
            Descriptors::Binary { bytes, data } => data.get(i * bytes..(i + 1) * bytes),
            Descriptors::Float { .. } => None,
        }
    }
}

/// Which half of a strategy pair a name refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Detector,
    Extractor,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::Detector => f.write_str("detector"),
            StrategyKind::Extractor => f.write_str("extractor"),
        }
    }
}

/// Trait for pluggable keypoint detectors.
pub trait FeatureDetector: Send {
    fn name(&self) -> &str;

    /// Detect keypoints. Pixels where `mask` is zero never yield a keypoint.
    fn detect(&mut self, image: &GrayImage, mask: Option<&GrayImage>) -> Vec<KeyPoint>;
}

/// Trait for pluggable descriptor extractors.
pub trait DescriptorExtractor: Send {
    fn name(&self) -> &str;

    /// Describe `keypoints`, removing the ones that cannot be described
    /// (e.g. too close to the border) so rows and keypoints stay aligned.
    fn describe(&self, image: &GrayImage, keypoints: &mut Vec<KeyPoint>) -> Descriptors;
}

/// Whether `mask` allows a keypoint at pixel (x, y)
#[inline]
pub(crate) fn mask_allows(mask: Option<&GrayImage>, x: u32, y: u32) -> bool {
    match mask {
        Some(m) => m.get(x, y).is_some_and(|v| v != 0),
        None => true,
    }
}

/// Keep only the `max` strongest keypoints
pub(crate) fn retain_best(keypoints: &mut Vec<KeyPoint>, max: usize) {
    if keypoints.len() > max {
        keypoints.sort_by(|a, b| b.response.total_cmp(&a.response));
        keypoints.truncate(max);
    }
}

/// Enum dispatch for built-in detectors.
pub enum BuiltinDetector {
    Fast(DynamicAdaptedDetector<FastAdjuster>),
    Surf(DynamicAdaptedDetector<SurfAdjuster>),
    Sift(DogDetector),
    Star(StarDetector),
    Mser(MserDetector),
    Gftt(CornerDetector),
}

impl BuiltinDetector {
    pub fn name(&self) -> &str {
        match self {
            BuiltinDetector::Fast(_) => "FAST",
            BuiltinDetector::Surf(_) => "SURF",
            BuiltinDetector::Sift(_) => "SIFT",
            BuiltinDetector::Star(_) => "STAR",
            BuiltinDetector::Mser(_) => "MSER",
            BuiltinDetector::Gftt(_) => "GFTT",
        }
    }

    pub fn detect(&mut self, image: &GrayImage, mask: Option<&GrayImage>) -> Vec<KeyPoint> {
        match self {
            BuiltinDetector::Fast(d) => d.detect(image, mask),
            BuiltinDetector::Surf(d) => d.detect(image, mask),
            BuiltinDetector::Sift(d) => d.detect(image, mask),
            BuiltinDetector::Star(d) => d.detect(image, mask),
            BuiltinDetector::Mser(d) => d.detect(image, mask),
            BuiltinDetector::Gftt(d) => d.detect(image, mask),
        }
    }
}

/// Wrapper that holds either a built-in detector or a plugin.
pub enum AnyDetector {
    Builtin(BuiltinDetector),
    Plugin(Box<dyn FeatureDetector>),
}

impl AnyDetector {
    pub fn name(&self) -> &str {
        match self {
            AnyDetector::Builtin(d) => d.name(),
            AnyDetector::Plugin(d) => d.name(),
        }
    }

    pub fn detect(&mut self, image: &GrayImage, mask: Option<&GrayImage>) -> Vec<KeyPoint> {
        match self {
            AnyDetector::Builtin(d) => d.detect(image, mask),
            AnyDetector::Plugin(d) => d.detect(image, mask),
        }
    }
}

/// Enum dispatch for built-in extractors.
pub enum BuiltinExtractor {
    Surf(SurfExtractor),
    Sift(SiftExtractor),
    Brief(BriefExtractor),
}

impl BuiltinExtractor {
    pub fn name(&self) -> &str {
        match self {
            BuiltinExtractor::Surf(_) => "SURF",
            BuiltinExtractor::Sift(_) => "SIFT",
            BuiltinExtractor::Brief(_) => "BRIEF",
        }
    }

    pub fn describe(&self, image: &GrayImage, keypoints: &mut Vec<KeyPoint>) -> Descriptors {
        match self {
            BuiltinExtractor::Surf(e) => e.describe(image, keypoints),
            BuiltinExtractor::Sift(e) => e.describe(image, keypoints),
            BuiltinExtractor::Brief(e) => e.describe(image, keypoints),
        }
    }
}

/// Wrapper that holds either a built-in extractor or a plugin.
pub enum AnyExtractor {
    Builtin(BuiltinExtractor),
    Plugin(Box<dyn DescriptorExtractor>),
}

impl AnyExtractor {
    pub fn name(&self) -> &str {
        match self {
            AnyExtractor::Builtin(e) => e.name(),
            AnyExtractor::Plugin(e) => e.name(),
        }
    }

    pub fn describe(&self, image: &GrayImage, keypoints: &mut Vec<KeyPoint>) -> Descriptors {
        match self {
            AnyExtractor::Builtin(e) => e.describe(image, keypoints),
            AnyExtractor::Plugin(e) => e.describe(image, keypoints),
        }
    }
}
