//! Optional tap that copies admitted frames out of the pipeline.

use super::frame::SensorFrame;
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender};

/// Receives every frame that passes the playback gate
pub trait RecordingSink: Send {
    fn record(&mut self, frame: &SensorFrame);

    /// Frames that could not be recorded
    fn dropped(&self) -> u64 {
        0
    }
}

/// Records nothing
#[derive(Debug, Default)]
pub struct NullRecorder;

impl RecordingSink for NullRecorder {
    fn record(&mut self, _frame: &SensorFrame) {}
}

/// A frame copied out by [`RecordingTap`]
#[derive(Debug, Clone)]
pub struct RecordedFrame {
    pub recorded_at: DateTime<Utc>,
    pub frame: SensorFrame,
}

/// Forwards frames to a bounded channel, dropping when the reader lags
pub struct RecordingTap {
    tx: Sender<RecordedFrame>,
    dropped: u64,
}

impl RecordingTap {
    pub fn new(capacity: usize) -> (Self, Receiver<RecordedFrame>) {
        let (tx, rx) = bounded(capacity);
        (Self { tx, dropped: 0 }, rx)
    }
}

impl RecordingSink for RecordingTap {
    fn record(&mut self, frame: &SensorFrame) {
        let recorded = RecordedFrame {
            recorded_at: Utc::now(),
            frame: frame.clone(),
        };
        if self.tx.try_send(recorded).is_err() {
            self.dropped += 1;
            tracing::trace!("Recording channel full, frame {:?} dropped", frame.timestamp);
        }
    }

    fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DepthImage, GrayImage, PointCloud, Stamped};
    use std::sync::Arc;
    use std::time::Duration;

    fn frame(ms: u64) -> SensorFrame {
        let t = Duration::from_millis(ms);
        SensorFrame::new(
            Stamped::new(t, GrayImage::new(2, 2)),
            Stamped::new(t, DepthImage::new(2, 2)),
            Stamped::new(t, Arc::new(PointCloud::organized(2, 2, "camera"))),
        )
    }

    #[test]
    fn test_tap_forwards_then_drops_when_full() {
        let (mut tap, rx) = RecordingTap::new(1);
        tap.record(&frame(1));
        tap.record(&frame(2));
        assert_eq!(tap.dropped(), 1);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.frame.timestamp, Duration::from_millis(1));
        assert!(rx.try_recv().is_err());
    }
}
