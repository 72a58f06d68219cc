//! Frame pipeline: from three raw sensor streams to graph nodes and
//! published clouds.
//!
//! # Architecture
//!
//! ```text
//! [visual]─┐
//! [depth ]─┼─► [FrameSynchronizer] ─► validate ─► [DepthNormalizer] ─► display
//! [cloud ]─┘                                          │
//!                                              playback gate (PipelineState)
//!                                                     │
//!                             [NodeBuilder] ─► [OverloadGuard] ─► [GraphIntegrator]
//!                                                                   │ worker thread
//!                                                          GraphSubsystem + ResultPublisher
//! ```
//!
//! # Design
//!
//! - **Dedicated thread**: `FramePipeline::run` serves a bounded sensor
//!   channel and a command channel with `crossbeam_channel::select!`.
//! - **Single flight**: the integrator keeps one pending handle and waits on
//!   it before every dispatch.
//! - **Lock-free controls**: pause, step and first-frame flags are atomics
//!   shared through `Arc<PipelineState>`.
//! - **Reused buffers**: depth and display conversions write into buffers
//!   owned by the pipeline instance.

pub mod bridge;
pub mod depth;
pub mod display;
pub mod executor;
pub mod frame;
pub mod guard;
pub mod integrator;
pub mod node_builder;
pub mod publisher;
pub mod recorder;
pub mod state;
pub mod stats;
pub mod sync;

pub use bridge::{ControlCommand, ControlHandle, PipelineBridge, STATUS_RUNNING, STATUS_STOPPED};
pub use depth::{depth_to_mono8, DepthNormalizer};
pub use display::{
    ChannelDisplay, DisplayChannel, DisplayMessage, DisplaySink, LogDisplay, NullDisplay,
    RgbaConverter,
};
pub use executor::{FrameOutcome, FramePipeline, PipelineBuilder, STATUS_FEATURES};
pub use frame::{SensorFrame, SensorMessage};
pub use guard::OverloadGuard;
pub use integrator::{GraphIntegrator, IntegrationReport, PendingIntegration, STATUS_GRAPH};
pub use node_builder::{BuildOutput, NodeBuilder};
pub use publisher::{
    CloudSubscription, CloudTopic, PublishSummary, PublisherTopics, ResultPublisher, StampedCloud,
};
pub use recorder::{NullRecorder, RecordedFrame, RecordingSink, RecordingTap};
pub use state::{Admission, PipelineState};
pub use stats::PipelineStats;
pub use sync::FrameSynchronizer;
