//! Name-keyed construction of detectors and extractors.
//!
//! Names are matched case-insensitively. Plugin factories registered under a
//! name take precedence over the built-in strategy of the same name. Unknown
//! names fall back to SURF with a single warning.

use super::{
    AnyDetector, AnyExtractor, BriefExtractor, BuiltinDetector, BuiltinExtractor, CornerDetector,
    DescriptorExtractor, DogDetector, DynamicAdaptedDetector, FastAdjuster, FeatureDetector,
    MserDetector, SiftExtractor, StarDetector, StrategyKind, SurfAdjuster, SurfExtractor,
};
use crate::config::FeatureConfig;
use crate::error::{FrontendError, Result};
use std::collections::HashMap;

pub const DEFAULT_DETECTOR: &str = "SURF";
pub const DEFAULT_EXTRACTOR: &str = "SURF";

/// Built-in detector names
pub const DETECTOR_NAMES: [&str; 6] = ["FAST", "STAR", "SIFT", "SURF", "MSER", "GFTT"];
/// Built-in extractor names
pub const EXTRACTOR_NAMES: [&str; 3] = ["SIFT", "SURF", "BRIEF"];

pub type DetectorFactory = Box<dyn Fn() -> Box<dyn FeatureDetector> + Send + Sync>;
pub type ExtractorFactory = Box<dyn Fn() -> Box<dyn DescriptorExtractor> + Send + Sync>;

/// Builds the detector/extractor pair named in the configuration.
pub trait FeatureStrategyProvider {
    fn create_detector(&self, name: &str) -> Result<AnyDetector>;
    fn create_extractor(&self, name: &str) -> Result<AnyExtractor>;
}

/// Keypoint window and iteration budgets for the adaptive detectors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjusterLimits {
    pub min_keypoints: usize,
    pub max_keypoints: usize,
    pub fast_max_iterations: usize,
    pub surf_max_iterations: usize,
}

impl From<&FeatureConfig> for AdjusterLimits {
    fn from(config: &FeatureConfig) -> Self {
        Self {
            min_keypoints: config.adjuster_min_keypoints,
            max_keypoints: config.adjuster_max_keypoints,
            fast_max_iterations: config.fast_adjuster_max_iterations,
            surf_max_iterations: config.surf_adjuster_max_iterations,
        }
    }
}

impl Default for AdjusterLimits {
    fn default() -> Self {
        Self::from(&FeatureConfig::default())
    }
}

/// Built-in strategies plus runtime-registered plugins
pub struct StrategyRegistry {
    limits: AdjusterLimits,
    detectors: HashMap<String, DetectorFactory>,
    extractors: HashMap<String, ExtractorFactory>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new(AdjusterLimits::default())
    }
}

impl StrategyRegistry {
    pub fn new(limits: AdjusterLimits) -> Self {
        Self {
            limits,
            detectors: HashMap::new(),
            extractors: HashMap::new(),
        }
    }

    pub fn from_config(config: &FeatureConfig) -> Self {
        Self::new(AdjusterLimits::from(config))
    }

    /// Register a plugin detector under `name`
    pub fn register_detector(&mut self, name: &str, factory: DetectorFactory) {
        self.detectors.insert(name.trim().to_ascii_uppercase(), factory);
    }

    /// Register a plugin extractor under `name`
    pub fn register_extractor(&mut self, name: &str, factory: ExtractorFactory) {
        self.extractors.insert(name.trim().to_ascii_uppercase(), factory);
    }

    fn check_limits(&self, name: &str) -> Result<()> {
        let limits = &self.limits;
        if limits.min_keypoints > limits.max_keypoints {
            return Err(FrontendError::StrategyConstruction {
                kind: StrategyKind::Detector,
                name: name.to_string(),
                reason: format!(
                    "adjuster minimum of {} keypoints exceeds maximum of {}",
                    limits.min_keypoints, limits.max_keypoints
                ),
            });
        }
        Ok(())
    }

    fn builtin_detector(&self, key: &str) -> Result<Option<BuiltinDetector>> {
        let l = &self.limits;
        let detector = match key {
            "FAST" => {
                self.check_limits(key)?;
                BuiltinDetector::Fast(DynamicAdaptedDetector::new(
                    FastAdjuster::default(),
                    l.min_keypoints,
                    l.max_keypoints,
                    l.fast_max_iterations,
                ))
            }
            "SURF" => {
                self.check_limits(key)?;
                BuiltinDetector::Surf(DynamicAdaptedDetector::new(
                    SurfAdjuster::default(),
                    l.min_keypoints,
                    l.max_keypoints,
                    l.surf_max_iterations,
                ))
            }
            "SIFT" => BuiltinDetector::Sift(DogDetector::default()),
            "STAR" => BuiltinDetector::Star(StarDetector::default()),
            "MSER" => BuiltinDetector::Mser(MserDetector::default()),
            "GFTT" => BuiltinDetector::Gftt(CornerDetector::default()),
            _ => return Ok(None),
        };
        Ok(Some(detector))
    }

    fn builtin_extractor(key: &str) -> Option<BuiltinExtractor> {
        match key {
            "SURF" => Some(BuiltinExtractor::Surf(SurfExtractor)),
            "SIFT" => Some(BuiltinExtractor::Sift(SiftExtractor)),
            "BRIEF" => Some(BuiltinExtractor::Brief(BriefExtractor::new())),
            _ => None,
        }
    }
}

impl FeatureStrategyProvider for StrategyRegistry {
    fn create_detector(&self, name: &str) -> Result<AnyDetector> {
        let key = name.trim().to_ascii_uppercase();
        if let Some(factory) = self.detectors.get(&key) {
            tracing::debug!("Using plugin detector '{}'", key);
            return Ok(AnyDetector::Plugin(factory()));
        }
        if let Some(detector) = self.builtin_detector(&key)? {
            return Ok(AnyDetector::Builtin(detector));
        }
        tracing::warn!(
            "{} is not a known detector type, using {}",
            name,
            DEFAULT_DETECTOR
        );
        match self.builtin_detector(DEFAULT_DETECTOR)? {
            Some(detector) => Ok(AnyDetector::Builtin(detector)),
            None => Err(FrontendError::StrategyConstruction {
                kind: StrategyKind::Detector,
                name: name.to_string(),
                reason: "default detector unavailable".to_string(),
            }),
        }
    }

    fn create_extractor(&self, name: &str) -> Result<AnyExtractor> {
        let key = name.trim().to_ascii_uppercase();
        if let Some(factory) = self.extractors.get(&key) {
            tracing::debug!("Using plugin extractor '{}'", key);
            return Ok(AnyExtractor::Plugin(factory()));
        }
        if let Some(extractor) = Self::builtin_extractor(&key) {
            return Ok(AnyExtractor::Builtin(extractor));
        }
        tracing::warn!(
            "{} is not a known extractor type, using {}",
            name,
            DEFAULT_EXTRACTOR
        );
        Self::builtin_extractor(DEFAULT_EXTRACTOR)
            .map(AnyExtractor::Builtin)
            .ok_or_else(|| FrontendError::StrategyConstruction {
                kind: StrategyKind::Extractor,
                name: name.to_string(),
                reason: "default extractor unavailable".to_string(),
            })
    }
}
