//! Configuration module for the RGB-D front-end
//!
//! All tunables live in one [`FrontendConfig`] that is injected into the
//! pipeline at construction time; there are no process-wide settings.
//!
//! # Config Location
//!
//! When no path is given on the command line the config is read from the
//! platform config directory under `rgbd-frontend/frontend.toml`:
//! - **Linux**: `~/.config/rgbd-frontend/`
//! - **macOS**: `~/Library/Application Support/rgbd-frontend/`
//! - **Windows**: `%APPDATA%\rgbd-frontend\`
//!
//! # Example
//!
//! ```ignore
//! use rgbd_frontend::config::FrontendConfig;
//!
//! let mut config = FrontendConfig::load_or_default();
//! config.features.detector = "FAST".to_string();
//! config.pipeline.start_paused = true;
//! config.save("frontend.toml")?;
//! ```

use crate::error::{FrontendError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for config directories
pub const APP_ID: &str = "rgbd-frontend";

/// Config filename
pub const CONFIG_FILE: &str = "frontend.toml";

/// Default per-stream synchronizer queue length
pub const DEFAULT_QUEUE_SIZE: usize = 3;

/// Default matching tolerance between stream timestamps in milliseconds
pub const DEFAULT_TOLERANCE_MS: f64 = 20.0;

/// Default node construction budget before the pipeline pauses itself
pub const DEFAULT_OVERLOAD_BUDGET_SECS: f64 = 15.0;

/// Default depth-to-mono8 scale factor (meters → centimeters)
pub const DEFAULT_DEPTH_SCALE: f32 = 100.0;

// ==================== Config Directory ====================

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the default config file path
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== Sections ====================

/// Input stream names, used for logging and for recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub visual_topic: String,
    pub depth_topic: String,
    pub cloud_topic: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            visual_topic: "/camera/rgb/image_mono".to_string(),
            depth_topic: "/camera/depth/image".to_string(),
            cloud_topic: "/camera/rgb/points".to_string(),
        }
    }
}

/// Approximate-time synchronizer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum buffered elements per stream; the oldest is dropped beyond this
    pub queue_size: usize,
    /// Maximum spread between the three timestamps of one frame
    pub tolerance_ms: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            queue_size: DEFAULT_QUEUE_SIZE,
            tolerance_ms: DEFAULT_TOLERANCE_MS,
        }
    }
}

/// Saturating conversion; negative and NaN map to zero
fn seconds(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}

fn check_duration(key: &str, secs: f64) -> Result<()> {
    Duration::try_from_secs_f64(secs)
        .map(|_| ())
        .map_err(|e| FrontendError::Config(format!("{} is not a usable duration: {}", key, e)))
}

impl SyncConfig {
    pub fn tolerance(&self) -> Duration {
        seconds(self.tolerance_ms / 1000.0)
    }
}

/// Feature strategy selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Detector name (FAST, STAR, SIFT, SURF, MSER, GFTT)
    pub detector: String,
    /// Descriptor extractor name (SIFT, SURF, BRIEF)
    pub extractor: String,
    /// Lower bound the adaptive detectors try to reach
    pub adjuster_min_keypoints: usize,
    /// Upper bound the adaptive detectors try to stay under
    pub adjuster_max_keypoints: usize,
    pub fast_adjuster_max_iterations: usize,
    pub surf_adjuster_max_iterations: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            detector: "SURF".to_string(),
            extractor: "SURF".to_string(),
            adjuster_min_keypoints: 300,
            adjuster_max_keypoints: 600,
            fast_adjuster_max_iterations: 10,
            surf_adjuster_max_iterations: 5,
        }
    }
}

/// How the pipeline hands nodes to the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationMode {
    /// Integrate on the worker thread while the next frame is acquired
    #[default]
    Background,
    /// Wait for each integration before returning from the frame
    Inline,
}

/// Pipeline behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Whether processing starts paused (display still updates)
    pub start_paused: bool,
    /// Node construction time above which the pipeline pauses itself
    pub overload_budget_secs: f64,
    /// Multiplier applied to depth before clamping into mono8
    pub depth_scale: f32,
    pub integration_mode: IntegrationMode,
    /// Steps faster than this are not reported on the `timings` target
    pub min_time_reported_secs: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            start_paused: false,
            overload_budget_secs: DEFAULT_OVERLOAD_BUDGET_SECS,
            depth_scale: DEFAULT_DEPTH_SCALE,
            integration_mode: IntegrationMode::Background,
            min_time_reported_secs: 0.01,
        }
    }
}

impl PipelineConfig {
    pub fn overload_budget(&self) -> Duration {
        seconds(self.overload_budget_secs)
    }

    pub fn min_time_reported(&self) -> Duration {
        seconds(self.min_time_reported_secs)
    }
}

/// Result re-publication topics and frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Original cloud re-stamped into the SLAM frame
    pub reframed_topic: String,
    /// Cloud transformed into the fixed frame (expensive)
    pub transformed_topic: String,
    /// First accepted cloud, sent once
    pub reference_topic: String,
    pub slam_frame_id: String,
    pub fixed_frame_id: String,
    /// Per-subscriber channel capacity
    pub subscriber_capacity: usize,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            reframed_topic: "/rgbdslam/cloud".to_string(),
            transformed_topic: "/rgbdslam/transformed_slowdown_cloud".to_string(),
            reference_topic: "/rgbdslam/first_frame".to_string(),
            slam_frame_id: "/slam_transform".to_string(),
            fixed_frame_id: "/openni_camera".to_string(),
            subscriber_capacity: 2,
        }
    }
}

/// Raw stream recording tap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub enabled: bool,
    /// Frames buffered for the recorder before new ones are dropped
    pub queue_capacity: usize,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            queue_capacity: 8,
        }
    }
}

/// Log output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for daily-rolling log files; stdout only when unset
    pub directory: Option<PathBuf>,
}

// ==================== Frontend Config ====================

/// Complete front-end configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontendConfig {
    pub streams: StreamConfig,
    pub sync: SyncConfig,
    pub features: FeatureConfig,
    pub pipeline: PipelineConfig,
    pub publish: PublishConfig,
    pub recording: RecordingConfig,
    pub logging: LoggingConfig,
}

impl FrontendConfig {
    /// Load and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FrontendError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML string (missing sections fall back to defaults)
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| FrontendError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load from the default location, returning defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = default_config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save as pretty TOML, creating parent directories as needed
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                FrontendError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| {
            FrontendError::Serialization(format!("Failed to serialize config: {}", e))
        })?;
        std::fs::write(path, content)
            .map_err(|e| FrontendError::Config(format!("Failed to write config: {}", e)))
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.sync.queue_size == 0 {
            return Err(FrontendError::Config(
                "sync.queue_size must be at least 1".to_string(),
            ));
        }
        if !self.sync.tolerance_ms.is_finite() || self.sync.tolerance_ms < 0.0 {
            return Err(FrontendError::Config(
                "sync.tolerance_ms must be a non-negative number".to_string(),
            ));
        }
        check_duration("sync.tolerance_ms", self.sync.tolerance_ms / 1000.0)?;
        if self.features.adjuster_min_keypoints > self.features.adjuster_max_keypoints {
            return Err(FrontendError::Config(format!(
                "features.adjuster_min_keypoints ({}) exceeds adjuster_max_keypoints ({})",
                self.features.adjuster_min_keypoints, self.features.adjuster_max_keypoints
            )));
        }
        if !(self.pipeline.overload_budget_secs > 0.0) {
            return Err(FrontendError::Config(
                "pipeline.overload_budget_secs must be positive".to_string(),
            ));
        }
        check_duration("pipeline.overload_budget_secs", self.pipeline.overload_budget_secs)?;
        check_duration("pipeline.min_time_reported_secs", self.pipeline.min_time_reported_secs)?;
        if !self.pipeline.depth_scale.is_finite() {
            return Err(FrontendError::Config(
                "pipeline.depth_scale must be finite".to_string(),
            ));
        }
        Ok(())
    }
}
