//! Feature node construction.

use super::frame::SensorFrame;
use crate::config::FeatureConfig;
use crate::error::Result;
use crate::features::{AnyDetector, AnyExtractor, FeatureStrategyProvider};
use crate::graph::FeatureNode;
use crate::types::GrayImage;
use std::time::{Duration, Instant};

/// A freshly built node and how long building it took
#[derive(Debug)]
pub struct BuildOutput {
    pub node: FeatureNode,
    pub elapsed: Duration,
}

/// Runs keypoint detection and description on admitted frames.
///
/// Strategies are fixed at construction and stay fixed for the lifetime of
/// the builder.
pub struct NodeBuilder {
    detector: AnyDetector,
    extractor: AnyExtractor,
}

impl NodeBuilder {
    pub fn new(detector: AnyDetector, extractor: AnyExtractor) -> Self {
        Self { detector, extractor }
    }

    /// Resolve the configured detector and extractor names
    pub fn from_provider(
        provider: &dyn FeatureStrategyProvider,
        config: &FeatureConfig,
    ) -> Result<Self> {
        let detector = provider.create_detector(&config.detector)?;
        let extractor = provider.create_extractor(&config.extractor)?;
        tracing::info!(
            "Feature strategies: detector {}, extractor {}",
            detector.name(),
            extractor.name()
        );
        Ok(Self::new(detector, extractor))
    }

    pub fn detector_name(&self) -> &str {
        self.detector.name()
    }

    pub fn extractor_name(&self) -> &str {
        self.extractor.name()
    }

    /// Detect and describe keypoints on `frame`, masked by the normalized depth.
    ///
    /// Pixels whose mask value is zero never produce keypoints.
    pub fn build(&mut self, frame: &SensorFrame, depth_mask: &GrayImage) -> BuildOutput {
        let started = Instant::now();
        let mut keypoints = self.detector.detect(&frame.visual, Some(depth_mask));
        let detected = keypoints.len();
        let descriptors = self.extractor.describe(&frame.visual, &mut keypoints);
        let node = FeatureNode::new(
            frame.timestamp,
            frame.cloud.clone(),
            keypoints,
            descriptors,
            depth_mask.clone(),
        );
        let elapsed = started.elapsed();
        tracing::debug!(
            "Built node {:?}: {} keypoints detected, {} described, {} located in {:?}",
            frame.timestamp,
            detected,
            node.keypoints().len(),
            node.located_features(),
            elapsed
        );
        BuildOutput { node, elapsed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_images::squares;
    use crate::features::{
        BuiltinExtractor, Descriptors, FeatureDetector, KeyPoint, StrategyRegistry, SurfExtractor,
    };
    use crate::types::{DepthImage, PointCloud, Stamped};
    use std::sync::Arc;

    struct GridDetector;

    impl FeatureDetector for GridDetector {
        fn name(&self) -> &str {
            "GRID"
        }

        fn detect(&mut self, image: &GrayImage, mask: Option<&GrayImage>) -> Vec<KeyPoint> {
            let mut out = Vec::new();
            for y in (8..image.height().saturating_sub(8)).step_by(8) {
                for x in (8..image.width().saturating_sub(8)).step_by(8) {
                    if crate::features::mask_allows(mask, x, y) {
                        out.push(KeyPoint::new(x as f32, y as f32, 9.0, 1.0));
                    }
                }
            }
            out
        }
    }

    fn frame(width: u32, height: u32) -> SensorFrame {
        let mut cloud = PointCloud::organized(width, height, "camera");
        for p in cloud.points.iter_mut() {
            *p = nalgebra::Point3::new(0.0, 0.0, 1.0);
        }
        SensorFrame::new(
            Stamped::new(Duration::from_millis(1), squares(width, height)),
            Stamped::new(Duration::from_millis(1), DepthImage::filled(width, height, 1.0)),
            Stamped::new(Duration::from_millis(1), Arc::new(cloud)),
        )
    }

    #[test]
    fn test_mask_excludes_zero_depth_pixels() {
        let f = frame(64, 48);
        let mut mask = GrayImage::filled(64, 48, 100);
        for y in 0..48 {
            for x in 0..32 {
                mask.put(x, y, 0);
            }
        }
        let mut builder = NodeBuilder::new(
            AnyDetector::Plugin(Box::new(GridDetector)),
            AnyExtractor::Builtin(BuiltinExtractor::Surf(SurfExtractor)),
        );
        let out = builder.build(&f, &mask);
        assert!(!out.node.keypoints().is_empty());
        assert!(out.node.keypoints().iter().all(|kp| kp.x >= 32.0));
        assert_eq!(out.node.descriptors().len(), out.node.keypoints().len());
        assert!(matches!(out.node.descriptors(), Descriptors::Float { dim: 64, .. }));
    }

    #[test]
    fn test_node_carries_frame_identity() {
        let f = frame(64, 48);
        let mask = GrayImage::filled(64, 48, 100);
        let mut builder = NodeBuilder::new(
            AnyDetector::Plugin(Box::new(GridDetector)),
            AnyExtractor::Builtin(BuiltinExtractor::Surf(SurfExtractor)),
        );
        let out = builder.build(&f, &mask);
        assert_eq!(out.node.timestamp(), f.timestamp);
        assert!(Arc::ptr_eq(out.node.cloud(), &f.cloud));
        assert_eq!(out.node.located_features(), out.node.keypoints().len());
    }

    #[test]
    fn test_from_provider_uses_configured_names() {
        let config = FeatureConfig {
            detector: "gftt".to_string(),
            extractor: "BRIEF".to_string(),
            ..FeatureConfig::default()
        };
        let registry = StrategyRegistry::from_config(&config);
        let builder = NodeBuilder::from_provider(&registry, &config).unwrap();
        assert_eq!(builder.detector_name(), "GFTT");
        assert_eq!(builder.extractor_name(), "BRIEF");
    }
}
