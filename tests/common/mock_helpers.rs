//! Mock construction helpers

use mockall::mock;
use nalgebra::Isometry3;
use rgbd_frontend::features::{FeatureDetector, KeyPoint};
use rgbd_frontend::graph::{AddNodeOutcome, FeatureNode, GraphSubsystem};
use rgbd_frontend::pipeline::{DisplayChannel, DisplaySink};
use rgbd_frontend::types::{GrayImage, RgbaImage};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

mock! {
    pub ScriptedGraph {}

    impl GraphSubsystem for ScriptedGraph {
        fn add_node(&mut self, node: FeatureNode) -> AddNodeOutcome;
        fn freshly_optimized(&self) -> bool;
        fn last_transform_time(&self) -> Duration;
        fn world_to_camera(&self) -> Isometry3<f32>;
        fn draw_feature_flow(&self, canvas: &mut GrayImage);
    }
}

mock! {
    pub Display {}

    impl DisplaySink for Display {
        fn show_image(&self, channel: DisplayChannel, image: &RgbaImage);
        fn set_status(&self, status: &str);
        fn set_info(&self, info: &str);
    }
}

/// A scripted graph that rejects every node and must never be asked for a
/// transform
pub fn rejecting_graph() -> MockScriptedGraph {
    let mut graph = MockScriptedGraph::new();
    graph
        .expect_add_node()
        .returning(AddNodeOutcome::Rejected);
    graph.expect_freshly_optimized().return_const(true);
    graph.expect_last_transform_time().never();
    graph.expect_world_to_camera().never();
    graph.expect_draw_feature_flow().never();
    graph
}

/// A scripted graph that accepts everything and reports a fresh optimization
pub fn accepting_graph() -> MockScriptedGraph {
    let mut graph = MockScriptedGraph::new();
    graph.expect_add_node().returning(|_| AddNodeOutcome::Accepted);
    graph.expect_freshly_optimized().return_const(true);
    graph
        .expect_last_transform_time()
        .return_const(Duration::from_millis(1));
    graph
        .expect_world_to_camera()
        .returning(Isometry3::identity);
    graph.expect_draw_feature_flow().return_const(());
    graph
}

/// Display that records status and info text
#[derive(Default)]
pub struct CaptureDisplay {
    statuses: Mutex<Vec<String>>,
    infos: Mutex<Vec<String>>,
    images: Mutex<Vec<DisplayChannel>>,
}

impl CaptureDisplay {
    pub fn statuses(&self) -> Vec<String> {
        self.statuses.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn infos(&self) -> Vec<String> {
        self.infos.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn images(&self) -> Vec<DisplayChannel> {
        self.images.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl DisplaySink for CaptureDisplay {
    fn show_image(&self, channel: DisplayChannel, _image: &RgbaImage) {
        self.images.lock().unwrap_or_else(PoisonError::into_inner).push(channel);
    }

    fn set_status(&self, status: &str) {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(status.to_string());
    }

    fn set_info(&self, info: &str) {
        self.infos
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(info.to_string());
    }
}

/// Plugin detector that takes a fixed time per frame and returns one keypoint
pub struct SlowDetector {
    pub delay: Duration,
}

impl FeatureDetector for SlowDetector {
    fn name(&self) -> &str {
        "SLOW"
    }

    fn detect(&mut self, image: &GrayImage, _mask: Option<&GrayImage>) -> Vec<KeyPoint> {
        std::thread::sleep(self.delay);
        vec![KeyPoint::new(
            image.width() as f32 / 2.0,
            image.height() as f32 / 2.0,
            9.0,
            1.0,
        )]
    }
}
