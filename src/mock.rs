//! Synthetic sensor rig and in-memory graph for running the pipeline
//! without hardware or a real optimizer.
//!
//! # Enabling
//!
//! Available with the `mock-sensor` feature (on by default):
//!
//! ```bash
//! cargo run --features mock-sensor
//! ```

use crate::features::{BruteForceMatcher, FeatureMatch, KeyPoint};
use crate::graph::{AddNodeOutcome, FeatureNode, GraphSubsystem};
use crate::pipeline::SensorMessage;
use crate::types::{DepthImage, GrayImage, PointCloud, Stamped};
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Generates consistent visual, depth and cloud messages for a camera
/// sliding sideways over a textured plane
#[derive(Debug, Clone)]
pub struct SyntheticRig {
    width: u32,
    height: u32,
    fx: f32,
    fy: f32,
    frame_id: String,
    period: Duration,
    /// Pixels the texture moves per frame
    speed: u32,
}

impl Default for SyntheticRig {
    fn default() -> Self {
        Self::new(160, 120)
    }
}

impl SyntheticRig {
    pub fn new(width: u32, height: u32) -> Self {
        let focal = 525.0 * width as f32 / 640.0;
        Self {
            width,
            height,
            fx: focal,
            fy: focal,
            frame_id: "/openni_rgb_optical_frame".to_string(),
            period: Duration::from_micros(33_333),
            speed: 2,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn with_speed(mut self, pixels_per_frame: u32) -> Self {
        self.speed = pixels_per_frame;
        self
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn timestamp(&self, index: u64) -> Duration {
        self.period * index as u32
    }

    /// Bright squares on a dark background, shifted `speed` pixels per frame
    pub fn visual(&self, index: u64) -> GrayImage {
        let shift = (index as u32).wrapping_mul(self.speed);
        GrayImage::from_fn(self.width, self.height, |x, y| {
            let u = x.wrapping_add(shift) % 16;
            let v = y % 16;
            let cell = (x.wrapping_add(shift) / 16 + y / 16) as u8;
            if (3..13).contains(&u) && (3..13).contains(&v) {
                200u8.saturating_add(cell % 4 * 10)
            } else {
                30
            }
        })
    }

    /// A slightly tilted plane around 1.5 m, with no returns in the
    /// leftmost sixteenth of the image
    pub fn depth(&self) -> DepthImage {
        let stripe = self.width / 16;
        DepthImage::from_fn(self.width, self.height, |x, y| {
            if x < stripe {
                f32::NAN
            } else {
                1.5 + 0.001 * y as f32
            }
        })
    }

    /// Back-project a depth image through the pinhole model
    pub fn cloud(&self, depth: &DepthImage) -> PointCloud {
        let (cx, cy) = (self.width as f32 / 2.0, self.height as f32 / 2.0);
        let mut cloud = PointCloud::organized(self.width, self.height, self.frame_id.clone());
        for y in 0..self.height {
            for x in 0..self.width {
                let z = depth.get(x, y).unwrap_or(f32::NAN);
                if z.is_finite() {
                    let i = (y * self.width + x) as usize;
                    cloud.points[i] = Point3::new(
                        (x as f32 - cx) * z / self.fx,
                        (y as f32 - cy) * z / self.fy,
                        z,
                    );
                }
            }
        }
        cloud
    }

    /// The three messages of frame `index`, all with the same stamp
    pub fn messages(&self, index: u64) -> [SensorMessage; 3] {
        let t = self.timestamp(index);
        let depth = self.depth();
        let cloud = self.cloud(&depth);
        [
            SensorMessage::Visual(Stamped::new(t, self.visual(index))),
            SensorMessage::Depth(Stamped::new(t, depth)),
            SensorMessage::Cloud(Stamped::new(t, cloud)),
        ]
    }
}

#[derive(Debug, Default)]
struct ProbeInner {
    accepted: Mutex<Vec<Duration>>,
    offered: AtomicU64,
    active: AtomicUsize,
    peak_concurrency: AtomicUsize,
}

/// Observation handle for a [`MockGraph`] that has moved to another thread
#[derive(Debug, Clone, Default)]
pub struct MockGraphProbe {
    inner: Arc<ProbeInner>,
}

impl MockGraphProbe {
    /// Timestamps of accepted nodes, in integration order
    pub fn accepted(&self) -> Vec<Duration> {
        self.inner
            .accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Nodes offered, accepted or not
    pub fn offered(&self) -> u64 {
        self.inner.offered.load(Ordering::SeqCst)
    }

    /// Most `add_node` calls ever running at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.inner.peak_concurrency.load(Ordering::SeqCst)
    }
}

/// Graph that accepts (or rejects) every node and fakes a pose chain
pub struct MockGraph {
    accept: bool,
    reoptimize_every: u64,
    latency: Duration,
    accepted_count: u64,
    fresh: bool,
    last_transform: Duration,
    pose: Isometry3<f32>,
    previous: Option<FeatureNode>,
    latest: Option<FeatureNode>,
    matches: Vec<FeatureMatch>,
    matcher: BruteForceMatcher,
    probe: MockGraphProbe,
}

impl Default for MockGraph {
    fn default() -> Self {
        Self::accepting()
    }
}

impl MockGraph {
    pub fn accepting() -> Self {
        Self {
            accept: true,
            reoptimize_every: 1,
            latency: Duration::ZERO,
            accepted_count: 0,
            fresh: false,
            last_transform: Duration::ZERO,
            pose: Isometry3::identity(),
            previous: None,
            latest: None,
            matches: Vec::new(),
            matcher: BruteForceMatcher::new(true),
            probe: MockGraphProbe::default(),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            accept: false,
            ..Self::accepting()
        }
    }

    /// Report a fresh optimization after every `n`th accepted node (0 = never)
    pub fn reoptimize_every(mut self, n: u64) -> Self {
        self.reoptimize_every = n;
        self
    }

    /// Sleep this long inside every `add_node`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn probe(&self) -> MockGraphProbe {
        self.probe.clone()
    }

    pub fn accepted_count(&self) -> u64 {
        self.accepted_count
    }

    /// Matches between the two most recent accepted nodes
    pub fn last_matches(&self) -> &[FeatureMatch] {
        &self.matches
    }
}

impl GraphSubsystem for MockGraph {
    fn add_node(&mut self, node: FeatureNode) -> AddNodeOutcome {
        let inner = &self.probe.inner;
        let now = inner.active.fetch_add(1, Ordering::SeqCst) + 1;
        inner.peak_concurrency.fetch_max(now, Ordering::SeqCst);
        inner.offered.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        let outcome = if self.accept {
            let mut node = node;
            self.accepted_count += 1;
            node.assign_id(self.accepted_count);
            self.fresh =
                self.reoptimize_every > 0 && self.accepted_count % self.reoptimize_every == 0;
            self.last_transform = node.timestamp();
            self.pose = Isometry3::from_parts(
                Translation3::new(0.01 * self.accepted_count as f32, 0.0, 0.0),
                UnitQuaternion::identity(),
            );
            self.matches = match &self.latest {
                Some(earlier) => node.match_against(earlier, &self.matcher),
                None => Vec::new(),
            };
            inner
                .accepted
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(node.timestamp());
            self.previous = self.latest.replace(node);
            AddNodeOutcome::Accepted
        } else {
            self.fresh = false;
            AddNodeOutcome::Rejected(node)
        };

        inner.active.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    fn freshly_optimized(&self) -> bool {
        self.fresh
    }

    fn last_transform_time(&self) -> Duration {
        self.last_transform
    }

    fn world_to_camera(&self) -> Isometry3<f32> {
        self.pose
    }

    fn draw_feature_flow(&self, canvas: &mut GrayImage) {
        let (Some(latest), Some(previous)) = (&self.latest, &self.previous) else {
            if let Some(latest) = &self.latest {
                latest.keypoints().iter().for_each(|kp| draw_cross(canvas, kp));
            }
            return;
        };
        for m in &self.matches {
            let (Some(to), Some(from)) = (
                latest.keypoints().get(m.query_idx),
                previous.keypoints().get(m.train_idx),
            ) else {
                continue;
            };
            draw_line(canvas, from.pixel(), to.pixel());
            draw_cross(canvas, to);
        }
    }
}

fn draw_cross(canvas: &mut GrayImage, kp: &KeyPoint) {
    let (x, y) = kp.pixel();
    canvas.put(x, y, 255);
    canvas.put(x.saturating_sub(1), y, 255);
    canvas.put(x + 1, y, 255);
    canvas.put(x, y.saturating_sub(1), 255);
    canvas.put(x, y + 1, 255);
}

/// Bresenham; out-of-bounds pixels are skipped by `put`
fn draw_line(canvas: &mut GrayImage, from: (u32, u32), to: (u32, u32)) {
    let (mut x, mut y) = (from.0 as i64, from.1 as i64);
    let (x1, y1) = (to.0 as i64, to.1 as i64);
    let dx = (x1 - x).abs();
    let dy = -(y1 - y).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        canvas.put(x as u32, y as u32, 255);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Descriptors;

    fn node(ms: u64) -> FeatureNode {
        FeatureNode::new(
            Duration::from_millis(ms),
            Arc::new(PointCloud::organized(4, 4, "camera")),
            vec![KeyPoint::new(1.0, 1.0, 7.0, 1.0)],
            Descriptors::Float {
                dim: 2,
                data: vec![0.5, 0.5],
            },
            GrayImage::filled(4, 4, 100),
        )
    }

    #[test]
    fn test_rig_streams_agree_on_geometry() {
        let rig = SyntheticRig::new(64, 48);
        let [visual, depth, cloud] = rig.messages(3);
        let t = rig.timestamp(3);
        assert!([&visual, &depth, &cloud].iter().all(|m| m.timestamp() == t));
        match (visual, depth, cloud) {
            (SensorMessage::Visual(v), SensorMessage::Depth(d), SensorMessage::Cloud(c)) => {
                assert_eq!(v.payload.dimensions(), (64, 48));
                assert_eq!(d.payload.dimensions(), (64, 48));
                assert_eq!(c.payload.dimensions(), (64, 48));
                assert!(c.payload.point_at(0, 10).is_none());
                assert!(c.payload.point_at(32, 24).is_some());
            }
            _ => panic!("messages out of role order"),
        }
    }

    #[test]
    fn test_reoptimization_cadence() {
        let mut graph = MockGraph::accepting().reoptimize_every(2);
        graph.add_node(node(1));
        assert!(!graph.freshly_optimized());
        graph.add_node(node(2));
        assert!(graph.freshly_optimized());
        assert_eq!(graph.last_transform_time(), Duration::from_millis(2));
        assert_eq!(graph.last_matches().len(), 1);
    }

    #[test]
    fn test_rejecting_graph_returns_node() {
        let mut graph = MockGraph::rejecting();
        let probe = graph.probe();
        assert!(!graph.add_node(node(5)).is_accepted());
        assert_eq!(probe.offered(), 1);
        assert!(probe.accepted().is_empty());
    }

    #[test]
    fn test_flow_drawn_between_matches() {
        let mut graph = MockGraph::accepting();
        graph.add_node(node(1));
        graph.add_node(node(2));
        let mut canvas = GrayImage::new(4, 4);
        graph.draw_feature_flow(&mut canvas);
        assert_eq!(canvas.get(1, 1), Some(255));
    }
}
