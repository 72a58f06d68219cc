//! Synchronized frames, the raw sensor messages they are built from, and
//! the geometry check every frame must pass before any further work.

use crate::error::{FrontendError, Result};
use crate::types::{DepthImage, GrayImage, PointCloud, Stamped, StreamRole};
use std::sync::Arc;
use std::time::Duration;

/// One element from one of the three input streams
#[derive(Debug, Clone)]
pub enum SensorMessage {
    Visual(Stamped<GrayImage>),
    Depth(Stamped<DepthImage>),
    Cloud(Stamped<PointCloud>),
}

impl SensorMessage {
    pub fn role(&self) -> StreamRole {
        match self {
            SensorMessage::Visual(_) => StreamRole::Visual,
            SensorMessage::Depth(_) => StreamRole::Depth,
            SensorMessage::Cloud(_) => StreamRole::Cloud,
        }
    }

    pub fn timestamp(&self) -> Duration {
        match self {
            SensorMessage::Visual(m) => m.timestamp,
            SensorMessage::Depth(m) => m.timestamp,
            SensorMessage::Cloud(m) => m.timestamp,
        }
    }
}

/// One correlated observation across all three streams.
///
/// Consumed within the processing step that receives it; never retained
/// by the pipeline.
#[derive(Debug, Clone)]
pub struct SensorFrame {
    /// Representative timestamp (the cloud's)
    pub timestamp: Duration,
    pub visual: GrayImage,
    pub depth: DepthImage,
    pub cloud: Arc<PointCloud>,
    /// Original timestamps, indexed by [`StreamRole::index`]
    pub source_stamps: [Duration; 3],
}

impl SensorFrame {
    pub fn new(
        visual: Stamped<GrayImage>,
        depth: Stamped<DepthImage>,
        cloud: Stamped<Arc<PointCloud>>,
    ) -> Self {
        Self {
            timestamp: cloud.timestamp,
            source_stamps: [visual.timestamp, depth.timestamp, cloud.timestamp],
            visual: visual.payload,
            depth: depth.payload,
            cloud: cloud.payload,
        }
    }

    pub fn stamp(&self, role: StreamRole) -> Duration {
        self.source_stamps[role.index()]
    }

    /// Reject frames whose sources disagree on width/height
    pub fn validate(&self) -> Result<()> {
        let visual = self.visual.dimensions();
        let depth = self.depth.dimensions();
        let cloud = self.cloud.dimensions();
        if visual != depth || visual != cloud {
            return Err(FrontendError::FrameGeometryMismatch {
                visual,
                depth,
                cloud,
            });
        }
        Ok(())
    }
}
