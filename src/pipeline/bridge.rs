//! Thread boundary between the processing thread and everything that feeds
//! or steers it.
//!
//! `PipelineBridge` is the caller-side handle: sensor input goes in through
//! a bounded channel, operator commands through [`ControlHandle`], and
//! downstream consumers subscribe to the publisher topics it exposes.

use super::display::DisplaySink;
use super::frame::SensorMessage;
use super::publisher::PublisherTopics;
use super::recorder::RecordedFrame;
use super::state::PipelineState;
use super::stats::PipelineStats;
use crate::types::{DepthImage, GrayImage, PointCloud, Stamped};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

/// Shown when the operator pauses processing
pub const STATUS_STOPPED: &str = "Processing Thread Stopped";
/// Shown when the operator resumes processing
pub const STATUS_RUNNING: &str = "Processing Thread Running";

/// Channel capacity for sensor messages (sources → pipeline).
/// Three streams at 30 Hz, about one second of slack.
pub(crate) const SENSOR_CHANNEL_CAPACITY: usize = 96;
/// Channel capacity for commands (control → pipeline).
pub(crate) const CMD_CHANNEL_CAPACITY: usize = 64;

/// Commands handled by the processing loop.
///
/// Pause and step never go through here; they flip atomics directly.
#[derive(Debug, Clone)]
pub enum ControlCommand {
    /// Reply with a snapshot of the counters
    RequestStats(Sender<PipelineStats>),
    /// Finish the pending integration and leave the run loop
    Shutdown,
}

/// Operator control surface. Cheap to clone and usable from any thread.
#[derive(Clone)]
pub struct ControlHandle {
    state: Arc<PipelineState>,
    display: Arc<dyn DisplaySink>,
    cmd_tx: Sender<ControlCommand>,
}

impl ControlHandle {
    pub(crate) fn new(
        state: Arc<PipelineState>,
        display: Arc<dyn DisplaySink>,
        cmd_tx: Sender<ControlCommand>,
    ) -> Self {
        Self {
            state,
            display,
            cmd_tx,
        }
    }

    /// Flip between Running and Paused. Returns true if now paused.
    pub fn toggle_pause(&self) -> bool {
        let paused = self.state.toggle_pause();
        self.display
            .set_status(if paused { STATUS_STOPPED } else { STATUS_RUNNING });
        tracing::info!("Processing {}", if paused { "paused" } else { "resumed" });
        paused
    }

    /// Let exactly one more frame through while paused
    pub fn step_one_frame(&self) {
        self.state.request_step();
        tracing::debug!("Single step requested");
    }

    pub fn is_paused(&self) -> bool {
        self.state.is_paused()
    }

    pub fn state(&self) -> &Arc<PipelineState> {
        &self.state
    }

    pub fn shutdown(&self) -> bool {
        self.cmd_tx.send(ControlCommand::Shutdown).is_ok()
    }

    /// Ask the processing loop for its counters
    pub fn request_stats(&self, timeout: Duration) -> Option<PipelineStats> {
        let (reply_tx, reply_rx) = bounded(1);
        self.cmd_tx.send(ControlCommand::RequestStats(reply_tx)).ok()?;
        reply_rx.recv_timeout(timeout).ok()
    }
}

/// Caller-side handle for a running pipeline
pub struct PipelineBridge {
    pub sensor_tx: Sender<SensorMessage>,
    control: ControlHandle,
    topics: PublisherTopics,
    recordings: Option<Receiver<RecordedFrame>>,
}

impl PipelineBridge {
    /// Create a bridge plus the pipeline-side receivers `(bridge, sensor_rx, cmd_rx)`
    pub(crate) fn new(
        state: Arc<PipelineState>,
        display: Arc<dyn DisplaySink>,
        topics: PublisherTopics,
        recordings: Option<Receiver<RecordedFrame>>,
    ) -> (Self, Receiver<SensorMessage>, Receiver<ControlCommand>) {
        let (sensor_tx, sensor_rx) = bounded(SENSOR_CHANNEL_CAPACITY);
        let (cmd_tx, cmd_rx) = bounded(CMD_CHANNEL_CAPACITY);
        let bridge = Self {
            sensor_tx,
            control: ControlHandle::new(state, display, cmd_tx),
            topics,
            recordings,
        };
        (bridge, sensor_rx, cmd_rx)
    }

    pub fn control(&self) -> ControlHandle {
        self.control.clone()
    }

    pub fn topics(&self) -> &PublisherTopics {
        &self.topics
    }

    /// Receiver for recorded frames, when recording is enabled
    pub fn recordings(&self) -> Option<&Receiver<RecordedFrame>> {
        self.recordings.as_ref()
    }

    // --- Sensor input ---

    /// Blocking send; false once the pipeline has stopped
    pub fn send(&self, msg: SensorMessage) -> bool {
        self.sensor_tx.send(msg).is_ok()
    }

    pub fn send_visual(&self, timestamp: Duration, image: GrayImage) -> bool {
        self.send(SensorMessage::Visual(Stamped::new(timestamp, image)))
    }

    pub fn send_depth(&self, timestamp: Duration, image: DepthImage) -> bool {
        self.send(SensorMessage::Depth(Stamped::new(timestamp, image)))
    }

    pub fn send_cloud(&self, timestamp: Duration, cloud: PointCloud) -> bool {
        self.send(SensorMessage::Cloud(Stamped::new(timestamp, cloud)))
    }

    // --- Control (same surface as ControlHandle) ---

    pub fn toggle_pause(&self) -> bool {
        self.control.toggle_pause()
    }

    pub fn step_one_frame(&self) {
        self.control.step_one_frame()
    }

    pub fn shutdown(&self) -> bool {
        self.control.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PublishConfig;
    use crate::pipeline::display::{ChannelDisplay, DisplayMessage};

    #[test]
    fn test_toggle_reports_status() {
        let state = Arc::new(PipelineState::new(false));
        let (display, rx) = ChannelDisplay::new(8);
        let (bridge, _sensor_rx, _cmd_rx) = PipelineBridge::new(
            state.clone(),
            Arc::new(display),
            PublisherTopics::new(&PublishConfig::default()),
            None,
        );

        assert!(bridge.toggle_pause());
        assert!(state.is_paused());
        assert!(!bridge.toggle_pause());

        let statuses: Vec<String> = rx
            .try_iter()
            .filter_map(|m| match m {
                DisplayMessage::Status(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(statuses, vec![STATUS_STOPPED, STATUS_RUNNING]);
    }

    #[test]
    fn test_commands_reach_pipeline_side() {
        let state = Arc::new(PipelineState::default());
        let (bridge, sensor_rx, cmd_rx) = PipelineBridge::new(
            state,
            Arc::new(crate::pipeline::display::NullDisplay),
            PublisherTopics::new(&PublishConfig::default()),
            None,
        );
        assert!(bridge.send_visual(Duration::from_millis(1), GrayImage::new(1, 1)));
        assert!(bridge.shutdown());
        assert!(matches!(sensor_rx.try_recv(), Ok(SensorMessage::Visual(_))));
        assert!(matches!(cmd_rx.try_recv(), Ok(ControlCommand::Shutdown)));
    }

    #[test]
    fn test_request_stats_times_out_without_pipeline() {
        let (bridge, _sensor_rx, _cmd_rx) = PipelineBridge::new(
            Arc::new(PipelineState::default()),
            Arc::new(crate::pipeline::display::NullDisplay),
            PublisherTopics::new(&PublishConfig::default()),
            None,
        );
        assert!(bridge.control().request_stats(Duration::from_millis(10)).is_none());
    }
}
