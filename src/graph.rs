//! Hand-off types shared with the graph-optimization subsystem.
//!
//! The pipeline builds a [`FeatureNode`] per admitted frame and gives it to
//! a [`GraphSubsystem`] by value. The subsystem either keeps it
//! ([`AddNodeOutcome::Accepted`]) or hands it back to be dropped.

use crate::features::{BruteForceMatcher, Descriptors, FeatureMatch, KeyPoint};
use crate::types::{GrayImage, PointCloud};
use nalgebra::{Isometry3, Point3};
use std::sync::Arc;
use std::time::Duration;

/// A frame after feature extraction, ready for graph integration
#[derive(Debug, Clone)]
pub struct FeatureNode {
    timestamp: Duration,
    cloud: Arc<PointCloud>,
    keypoints: Vec<KeyPoint>,
    descriptors: Descriptors,
    locations_3d: Vec<Option<Point3<f32>>>,
    depth_mask: GrayImage,
    /// Set by the graph subsystem once accepted
    id: Option<u64>,
}

impl FeatureNode {
    pub fn new(
        timestamp: Duration,
        cloud: Arc<PointCloud>,
        keypoints: Vec<KeyPoint>,
        descriptors: Descriptors,
        depth_mask: GrayImage,
    ) -> Self {
        let locations_3d = keypoints
            .iter()
            .map(|kp| {
                let (x, y) = kp.pixel();
                cloud.point_at(x, y).copied()
            })
            .collect();
        Self {
            timestamp,
            cloud,
            keypoints,
            descriptors,
            locations_3d,
            depth_mask,
            id: None,
        }
    }

    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    pub fn cloud(&self) -> &Arc<PointCloud> {
        &self.cloud
    }

    pub fn keypoints(&self) -> &[KeyPoint] {
        &self.keypoints
    }

    pub fn descriptors(&self) -> &Descriptors {
        &self.descriptors
    }

    /// Cloud point under each keypoint; `None` where depth was invalid
    pub fn feature_locations_3d(&self) -> &[Option<Point3<f32>>] {
        &self.locations_3d
    }

    /// Number of keypoints with a valid 3-D location
    pub fn located_features(&self) -> usize {
        self.locations_3d.iter().filter(|p| p.is_some()).count()
    }

    /// Normalized depth used as the detection mask
    pub fn depth_mask(&self) -> &GrayImage {
        &self.depth_mask
    }

    pub fn id(&self) -> Option<u64> {
        self.id
    }

    /// Graph-side annotation, only meaningful after acceptance
    pub fn assign_id(&mut self, id: u64) {
        self.id = Some(id);
    }

    /// Match this node's descriptors against an earlier node's
    pub fn match_against(
        &self,
        earlier: &FeatureNode,
        matcher: &BruteForceMatcher,
    ) -> Vec<FeatureMatch> {
        matcher.match_descriptors(&self.descriptors, &earlier.descriptors)
    }
}

/// Result of offering a node to the graph
#[derive(Debug)]
pub enum AddNodeOutcome {
    /// The graph took ownership
    Accepted,
    /// The graph declined; the node comes back to be discarded
    Rejected(FeatureNode),
}

impl AddNodeOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AddNodeOutcome::Accepted)
    }
}

/// The pose-graph backend.
///
/// Called from a single integration worker, never concurrently with itself.
pub trait GraphSubsystem: Send + 'static {
    fn add_node(&mut self, node: FeatureNode) -> AddNodeOutcome;

    /// Whether the last accepted node triggered a re-optimization
    fn freshly_optimized(&self) -> bool;

    /// Timestamp of the most recent corrected transform
    fn last_transform_time(&self) -> Duration;

    /// Current world-to-camera transform of the latest node
    fn world_to_camera(&self) -> Isometry3<f32>;

    /// Draw matched feature motion onto a copy of the visual image
    fn draw_feature_flow(&self, _canvas: &mut GrayImage) {}
}

impl<G: GraphSubsystem + ?Sized> GraphSubsystem for Box<G> {
    fn add_node(&mut self, node: FeatureNode) -> AddNodeOutcome {
        (**self).add_node(node)
    }

    fn freshly_optimized(&self) -> bool {
        (**self).freshly_optimized()
    }

    fn last_transform_time(&self) -> Duration {
        (**self).last_transform_time()
    }

    fn world_to_camera(&self) -> Isometry3<f32> {
        (**self).world_to_camera()
    }

    fn draw_feature_flow(&self, canvas: &mut GrayImage) {
        (**self).draw_feature_flow(canvas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_with(keypoints: Vec<KeyPoint>) -> FeatureNode {
        let mut cloud = PointCloud::organized(4, 4, "camera");
        cloud.points[5] = Point3::new(0.1, 0.1, 1.0);
        let n = keypoints.len();
        FeatureNode::new(
            Duration::from_millis(10),
            Arc::new(cloud),
            keypoints,
            Descriptors::Float {
                dim: 1,
                data: vec![0.0; n],
            },
            GrayImage::filled(4, 4, 100),
        )
    }

    #[test]
    fn test_feature_locations_follow_cloud_validity() {
        let node = node_with(vec![
            KeyPoint::new(1.0, 1.0, 7.0, 1.0),
            KeyPoint::new(3.0, 3.0, 7.0, 1.0),
        ]);
        assert_eq!(node.feature_locations_3d()[0], Some(Point3::new(0.1, 0.1, 1.0)));
        assert_eq!(node.feature_locations_3d()[1], None);
        assert_eq!(node.located_features(), 1);
    }

    #[test]
    fn test_rejected_outcome_returns_node() {
        let node = node_with(Vec::new());
        let outcome = AddNodeOutcome::Rejected(node);
        assert!(!outcome.is_accepted());
        match outcome {
            AddNodeOutcome::Rejected(n) => assert_eq!(n.timestamp(), Duration::from_millis(10)),
            AddNodeOutcome::Accepted => unreachable!(),
        }
    }
}
