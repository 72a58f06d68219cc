//! # rgbd-frontend: RGB-D SLAM front-end
//!
//! Turns three loosely timed sensor streams (a grey visual image, a float
//! depth image and an organized point cloud) into feature nodes for a
//! pose-graph optimizer, and republishes the corrected clouds it produces.
//!
//! ## Architecture
//!
//! - **Pipeline**: synchronization, validation, depth normalization and node
//!   construction on a dedicated processing thread
//! - **Features**: named keypoint detector and descriptor strategies
//! - **Graph**: the `GraphSubsystem` seam; integrations run one at a time on
//!   a worker thread
//! - **Communication**: crossbeam channels for sensor input, commands and
//!   cloud topics
//!
//! ## Configuration
//!
//! Settings are read from `frontend.toml` in the platform config directory
//! under `rgbd-frontend`:
//!
//! - **Linux**: `~/.config/rgbd-frontend/`
//! - **macOS**: `~/Library/Application Support/rgbd-frontend/`
//! - **Windows**: `%APPDATA%\rgbd-frontend\`
//!
//! ## Example
//!
//! ```ignore
//! use rgbd_frontend::config::FrontendConfig;
//! use rgbd_frontend::mock::{MockGraph, SyntheticRig};
//! use rgbd_frontend::pipeline::FramePipeline;
//!
//! let config = FrontendConfig::load_or_default();
//! let (pipeline, bridge) = FramePipeline::new(config, MockGraph::default())?;
//! let cloud_sub = bridge.topics().reframed.subscribe(2);
//! let handle = std::thread::spawn(move || pipeline.run());
//!
//! let rig = SyntheticRig::default();
//! for i in 0..30 {
//!     for msg in rig.messages(i) {
//!         bridge.send(msg);
//!     }
//! }
//! bridge.shutdown();
//! let graph = handle.join().unwrap();
//! ```

pub mod config;
pub mod error;
pub mod features;
pub mod graph;
#[cfg(feature = "mock-sensor")]
pub mod mock;
pub mod pipeline;
pub mod types;

// Re-export commonly used types
pub use config::FrontendConfig;
pub use error::{FrontendError, Result};
pub use graph::{AddNodeOutcome, FeatureNode, GraphSubsystem};
pub use pipeline::{FramePipeline, PipelineBridge, PipelineBuilder};
pub use types::{DepthImage, GrayImage, PointCloud, RgbaImage, Stamped, StreamRole};
