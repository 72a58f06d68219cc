//! Operator display surface.
//!
//! The pipeline converts mono8 images to RGBA into one reusable buffer per
//! channel and hands a borrowed view to a [`DisplaySink`]. Sinks that keep
//! an image must copy it before returning; the buffer is overwritten on the
//! next frame.

use crate::types::{GrayImage, RgbaImage};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};

/// Logical display channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayChannel {
    Visual,
    Depth,
    FeatureFlow,
}

impl DisplayChannel {
    pub const ALL: [DisplayChannel; 3] = [
        DisplayChannel::Visual,
        DisplayChannel::Depth,
        DisplayChannel::FeatureFlow,
    ];

    fn index(self) -> usize {
        match self {
            DisplayChannel::Visual => 0,
            DisplayChannel::Depth => 1,
            DisplayChannel::FeatureFlow => 2,
        }
    }
}

/// Receives display images and status text. Purely observational.
pub trait DisplaySink: Send + Sync {
    fn show_image(&self, channel: DisplayChannel, image: &RgbaImage);

    /// Short status line (what the pipeline is doing now)
    fn set_status(&self, status: &str);

    /// Longer operator-facing notice (warnings, overload)
    fn set_info(&self, info: &str);
}

/// Grey to RGBA conversion with one persistent buffer per channel
pub struct RgbaConverter {
    buffers: [RgbaImage; 3],
    reallocations: u64,
}

impl Default for RgbaConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl RgbaConverter {
    pub fn new() -> Self {
        Self {
            buffers: [RgbaImage::new(0, 0), RgbaImage::new(0, 0), RgbaImage::new(0, 0)],
            reallocations: 0,
        }
    }

    /// Convert `gray` into the channel's buffer with an opaque alpha
    pub fn convert(&mut self, channel: DisplayChannel, gray: &GrayImage) -> &RgbaImage {
        let buffer = &mut self.buffers[channel.index()];
        if buffer.ensure_dimensions(gray.width(), gray.height()) {
            self.reallocations += 1;
        }
        for (out, &g) in buffer.as_mut_slice().iter_mut().zip(gray.as_slice()) {
            *out = [g, g, g, 255];
        }
        buffer
    }

    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }
}

/// Discards everything
#[derive(Debug, Default)]
pub struct NullDisplay;

impl DisplaySink for NullDisplay {
    fn show_image(&self, _channel: DisplayChannel, _image: &RgbaImage) {}
    fn set_status(&self, _status: &str) {}
    fn set_info(&self, _info: &str) {}
}

/// Writes status and info text to the log; images are only traced
#[derive(Debug, Default)]
pub struct LogDisplay;

impl DisplaySink for LogDisplay {
    fn show_image(&self, channel: DisplayChannel, image: &RgbaImage) {
        tracing::trace!("display {:?}: {}x{}", channel, image.width(), image.height());
    }

    fn set_status(&self, status: &str) {
        tracing::info!("status: {}", status);
    }

    fn set_info(&self, info: &str) {
        tracing::warn!("{}", info);
    }
}

/// Messages produced by [`ChannelDisplay`]
#[derive(Debug, Clone)]
pub enum DisplayMessage {
    Image {
        channel: DisplayChannel,
        image: RgbaImage,
    },
    Status(String),
    Info(String),
}

/// Copies every update into a bounded channel for a UI thread to drain.
///
/// A full channel drops the update rather than stalling the pipeline.
pub struct ChannelDisplay {
    tx: Sender<DisplayMessage>,
    dropped: AtomicU64,
}

impl ChannelDisplay {
    pub fn new(capacity: usize) -> (Self, Receiver<DisplayMessage>) {
        let (tx, rx) = bounded(capacity);
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn send(&self, msg: DisplayMessage) {
        if self.tx.try_send(msg).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl DisplaySink for ChannelDisplay {
    fn show_image(&self, channel: DisplayChannel, image: &RgbaImage) {
        self.send(DisplayMessage::Image {
            channel,
            image: image.clone(),
        });
    }

    fn set_status(&self, status: &str) {
        self.send(DisplayMessage::Status(status.to_string()));
    }

    fn set_info(&self, info: &str) {
        self.send(DisplayMessage::Info(info.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converter_reuses_per_channel_buffers() {
        let mut converter = RgbaConverter::new();
        let gray = GrayImage::filled(3, 2, 77);
        let ptr = converter.convert(DisplayChannel::Visual, &gray).as_slice().as_ptr();
        converter.convert(DisplayChannel::Depth, &gray);
        assert_eq!(converter.reallocations(), 2);

        let out = converter.convert(DisplayChannel::Visual, &GrayImage::filled(3, 2, 9));
        assert_eq!(out.as_slice().as_ptr(), ptr);
        assert_eq!(out.get(0, 0), Some([9, 9, 9, 255]));
        assert_eq!(converter.reallocations(), 2);
    }

    #[test]
    fn test_channel_display_counts_drops() {
        let (display, rx) = ChannelDisplay::new(1);
        display.set_status("Running");
        display.set_info("second update has nowhere to go");
        assert_eq!(display.dropped(), 1);
        assert!(matches!(rx.try_recv(), Ok(DisplayMessage::Status(s)) if s == "Running"));
    }
}
