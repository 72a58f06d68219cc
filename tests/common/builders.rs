//! Test data builders for configs, frames and messages

use rgbd_frontend::config::{FrontendConfig, IntegrationMode};
use rgbd_frontend::pipeline::{SensorFrame, SensorMessage};
use rgbd_frontend::types::{DepthImage, GrayImage, PointCloud, Stamped};
use std::sync::Arc;
use std::time::Duration;

/// Builder for pipeline configurations used in tests.
///
/// Defaults to a cheap detector so frames process quickly.
pub struct ConfigBuilder {
    config: FrontendConfig,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let mut config = FrontendConfig::default();
        config.features.detector = "GFTT".to_string();
        config.features.extractor = "SURF".to_string();
        Self { config }
    }

    pub fn detector(mut self, name: &str) -> Self {
        self.config.features.detector = name.to_string();
        self
    }

    pub fn tolerance_ms(mut self, tolerance: f64) -> Self {
        self.config.sync.tolerance_ms = tolerance;
        self
    }

    pub fn start_paused(mut self, paused: bool) -> Self {
        self.config.pipeline.start_paused = paused;
        self
    }

    pub fn overload_budget_secs(mut self, secs: f64) -> Self {
        self.config.pipeline.overload_budget_secs = secs;
        self
    }

    pub fn inline(mut self) -> Self {
        self.config.pipeline.integration_mode = IntegrationMode::Inline;
        self
    }

    pub fn recording(mut self, capacity: usize) -> Self {
        self.config.recording.enabled = true;
        self.config.recording.queue_capacity = capacity;
        self
    }

    pub fn build(self) -> FrontendConfig {
        self.config
    }
}

/// Builder for a single synchronized frame with textured content
pub struct FrameBuilder {
    timestamp: Duration,
    visual: (u32, u32),
    depth: (u32, u32),
    cloud: (u32, u32),
    depth_value: f32,
}

impl FrameBuilder {
    pub fn new(timestamp: Duration) -> Self {
        Self {
            timestamp,
            visual: (64, 48),
            depth: (64, 48),
            cloud: (64, 48),
            depth_value: 1.0,
        }
    }

    pub fn depth_size(mut self, width: u32, height: u32) -> Self {
        self.depth = (width, height);
        self
    }

    pub fn cloud_size(mut self, width: u32, height: u32) -> Self {
        self.cloud = (width, height);
        self
    }

    pub fn build(self) -> SensorFrame {
        let [visual, depth, cloud] = self.messages();
        match (visual, depth, cloud) {
            (SensorMessage::Visual(v), SensorMessage::Depth(d), SensorMessage::Cloud(c)) => {
                SensorFrame::new(v, d, Stamped::new(c.timestamp, Arc::new(c.payload)))
            }
            _ => unreachable!(),
        }
    }

    pub fn messages(self) -> [SensorMessage; 3] {
        let t = self.timestamp;
        let mut cloud =
            PointCloud::organized(self.cloud.0, self.cloud.1, "/openni_rgb_optical_frame");
        for p in cloud.points.iter_mut() {
            *p = nalgebra::Point3::new(0.0, 0.0, self.depth_value);
        }
        [
            SensorMessage::Visual(Stamped::new(t, textured(self.visual.0, self.visual.1))),
            SensorMessage::Depth(Stamped::new(
                t,
                DepthImage::filled(self.depth.0, self.depth.1, self.depth_value),
            )),
            SensorMessage::Cloud(Stamped::new(t, cloud)),
        ]
    }
}

/// Bright squares on a dark background, one per 16-pixel cell
pub fn textured(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        if (3..13).contains(&(x % 16)) && (3..13).contains(&(y % 16)) {
            220
        } else {
            30
        }
    })
}
