//! The processing thread.
//!
//! `FramePipeline` owns every per-instance buffer and drives each
//! synchronized frame through the stages in order:
//!
//! ```text
//! sync ─▶ validate ─▶ normalize depth ─▶ display ─▶ playback gate
//!      ─▶ record ─▶ build node ─▶ overload guard ─▶ integrate (worker)
//! ```
//!
//! Per-frame errors stop at the frame that raised them.

use super::bridge::{ControlCommand, PipelineBridge};
use super::depth::DepthNormalizer;
use super::display::{DisplayChannel, DisplaySink, NullDisplay, RgbaConverter};
use super::frame::{SensorFrame, SensorMessage};
use super::guard::OverloadGuard;
use super::integrator::{GraphIntegrator, IntegrationReport};
use super::node_builder::NodeBuilder;
use super::publisher::{PublisherTopics, ResultPublisher};
use super::recorder::{NullRecorder, RecordedFrame, RecordingSink, RecordingTap};
use super::state::{Admission, PipelineState};
use super::stats::PipelineStats;
use super::sync::FrameSynchronizer;
use crate::config::{FrontendConfig, IntegrationMode};
use crate::error::Result;
use crate::features::StrategyRegistry;
use crate::graph::GraphSubsystem;
use crossbeam_channel::{select, Receiver};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Status shown while keypoints are detected and described
pub const STATUS_FEATURES: &str = "Computing Keypoints and Features";

/// How long the run loop idles before polling for finished integrations
const IDLE_POLL: Duration = Duration::from_millis(50);

/// What happened to one synchronized frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Source dimensions disagreed; nothing past validation ran
    GeometryRejected { timestamp: Duration },
    /// Displayed only, the pipeline is paused
    Skipped { timestamp: Duration },
    /// A node was built and handed to the graph
    Dispatched {
        timestamp: Duration,
        admission: Admission,
        overloaded: bool,
    },
    /// A node was built but the integration worker is gone
    IntegrationUnavailable { timestamp: Duration },
}

impl FrameOutcome {
    pub fn timestamp(&self) -> Duration {
        match *self {
            FrameOutcome::GeometryRejected { timestamp }
            | FrameOutcome::Skipped { timestamp }
            | FrameOutcome::Dispatched { timestamp, .. }
            | FrameOutcome::IntegrationUnavailable { timestamp } => timestamp,
        }
    }

    pub fn is_dispatched(&self) -> bool {
        matches!(self, FrameOutcome::Dispatched { .. })
    }
}

fn report_time(min: Duration, step: &str, elapsed: Duration) {
    if elapsed >= min {
        tracing::debug!(target: "timings", "{} runtime: {:.4} s", step, elapsed.as_secs_f64());
    }
}

/// Front-end pipeline for one sensor rig
pub struct FramePipeline<G: GraphSubsystem> {
    sync: FrameSynchronizer,
    normalizer: DepthNormalizer,
    converter: RgbaConverter,
    builder: NodeBuilder,
    guard: OverloadGuard,
    integrator: GraphIntegrator<G>,
    publisher: Arc<ResultPublisher>,
    state: Arc<PipelineState>,
    display: Arc<dyn DisplaySink>,
    recorder: Box<dyn RecordingSink>,
    stats: PipelineStats,
    mode: IntegrationMode,
    min_time_reported: Duration,
    sensor_rx: Receiver<SensorMessage>,
    cmd_rx: Receiver<ControlCommand>,
}

impl<G: GraphSubsystem> FramePipeline<G> {
    /// Build a pipeline with default display and strategies.
    ///
    /// Fails if the configuration is invalid or a feature strategy cannot be
    /// constructed.
    pub fn new(config: FrontendConfig, graph: G) -> Result<(Self, PipelineBridge)> {
        PipelineBuilder::new(config).build(graph)
    }

    pub fn state(&self) -> &Arc<PipelineState> {
        &self.state
    }

    pub fn topics(&self) -> &PublisherTopics {
        self.publisher.topics()
    }

    pub fn publisher(&self) -> &Arc<ResultPublisher> {
        &self.publisher
    }

    /// Highest number of integrations ever in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.integrator.max_in_flight()
    }

    pub fn in_flight(&self) -> usize {
        self.integrator.in_flight()
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            messages_dropped: self.sync.dropped() + self.sync.out_of_order(),
            recordings_dropped: self.recorder.dropped(),
            ..self.stats.clone()
        }
    }

    /// Feed one stream element and process every frame it completes
    pub fn push(&mut self, message: SensorMessage) -> Vec<FrameOutcome> {
        let mut outcomes = Vec::new();
        if !self.sync.push(message) {
            return outcomes;
        }
        while let Some(frame) = self.sync.pop_frame() {
            outcomes.push(self.process_frame(frame));
        }
        outcomes
    }

    /// Run one synchronized frame through every stage
    pub fn process_frame(&mut self, frame: SensorFrame) -> FrameOutcome {
        let timestamp = frame.timestamp;
        let min = self.min_time_reported;
        let frame_started = Instant::now();
        self.stats.frames_synchronized += 1;

        if let Some(report) = self.integrator.poll_completed() {
            self.handle_report(&report);
        }

        if let Err(e) = frame.validate() {
            tracing::error!("Dropping frame {:?}: {}", timestamp, e);
            self.display.set_status(&e.to_string());
            self.stats.rejected_geometry += 1;
            return FrameOutcome::GeometryRejected { timestamp };
        }

        let started = Instant::now();
        let mask = self.normalizer.normalize(&frame.depth);
        report_time(min, "depth normalization", started.elapsed());

        let started = Instant::now();
        self.display.show_image(
            DisplayChannel::Visual,
            self.converter.convert(DisplayChannel::Visual, &frame.visual),
        );
        self.display.show_image(
            DisplayChannel::Depth,
            self.converter.convert(DisplayChannel::Depth, mask),
        );
        report_time(min, "display conversion", started.elapsed());

        let admission = self.state.admit();
        match admission {
            Admission::Paused => {
                self.stats.skipped_paused += 1;
                return FrameOutcome::Skipped { timestamp };
            }
            Admission::Stepped => tracing::debug!("Stepping frame {:?}", timestamp),
            Admission::Running => {}
        }

        self.recorder.record(&frame);

        self.display.set_status(STATUS_FEATURES);
        let output = self.builder.build(&frame, mask);
        self.stats.nodes_built += 1;
        report_time(min, "node construction", output.elapsed);

        let overloaded = self
            .guard
            .enforce(output.elapsed, &self.state, self.display.as_ref());
        if overloaded {
            self.stats.overloads += 1;
        }

        let SensorFrame { visual, .. } = frame;
        match self.integrator.dispatch(output.node, visual) {
            Ok(previous) => {
                if let Some(report) = previous {
                    self.handle_report(&report);
                }
            }
            Err(e) => {
                tracing::error!("Cannot integrate node {:?}: {}", timestamp, e);
                return FrameOutcome::IntegrationUnavailable { timestamp };
            }
        }

        if self.mode == IntegrationMode::Inline {
            if let Some(report) = self.integrator.wait_for_pending() {
                self.handle_report(&report);
            }
        }

        report_time(min, "frame processing", frame_started.elapsed());
        FrameOutcome::Dispatched {
            timestamp,
            admission,
            overloaded,
        }
    }

    fn handle_report(&mut self, report: &IntegrationReport) {
        if report.accepted {
            self.stats.nodes_accepted += 1;
        } else {
            self.stats.nodes_rejected += 1;
        }
        self.stats.clouds_published += report.publications.count();
        report_time(self.min_time_reported, "graph integration", report.elapsed);

        if let Some(overlay) = &report.overlay {
            self.display.show_image(
                DisplayChannel::FeatureFlow,
                self.converter.convert(DisplayChannel::FeatureFlow, overlay),
            );
        }
    }

    /// Block until the integration in flight (if any) is done
    pub fn finish_pending(&mut self) -> Option<IntegrationReport> {
        let report = self.integrator.wait_for_pending()?;
        self.handle_report(&report);
        Some(report)
    }

    /// Finish outstanding work and hand the graph back
    pub fn shutdown(mut self) -> Option<G> {
        self.finish_pending();
        let stats = self.stats();
        match stats.to_json() {
            Ok(json) => tracing::info!("Pipeline stopped. Statistics:\n{}", json),
            Err(e) => tracing::warn!("Pipeline stopped; statistics unavailable: {}", e),
        }
        self.integrator.shutdown()
    }

    /// Serve sensor input and commands until shutdown.
    ///
    /// Returns the graph once the pending integration has finished.
    pub fn run(mut self) -> Option<G> {
        tracing::info!("Pipeline thread started");
        let sensor_rx = self.sensor_rx.clone();
        let cmd_rx = self.cmd_rx.clone();

        loop {
            select! {
                recv(cmd_rx) -> cmd => match cmd {
                    Ok(ControlCommand::RequestStats(reply)) => {
                        let _ = reply.send(self.stats());
                    }
                    Ok(ControlCommand::Shutdown) => {
                        tracing::info!("Shutdown requested");
                        break;
                    }
                    Err(_) => break,
                },
                recv(sensor_rx) -> msg => match msg {
                    Ok(msg) => {
                        self.push(msg);
                    }
                    Err(_) => {
                        tracing::info!("Sensor input closed");
                        break;
                    }
                },
                default(IDLE_POLL) => {
                    if let Some(report) = self.integrator.poll_completed() {
                        self.handle_report(&report);
                    }
                }
            }
        }

        tracing::info!("Pipeline thread exiting");
        self.shutdown()
    }
}

/// Assembles a [`FramePipeline`] and its [`PipelineBridge`]
pub struct PipelineBuilder {
    config: FrontendConfig,
    display: Option<Arc<dyn DisplaySink>>,
    recorder: Option<Box<dyn RecordingSink>>,
    strategies: Option<StrategyRegistry>,
}

impl PipelineBuilder {
    pub fn new(config: FrontendConfig) -> Self {
        Self {
            config,
            display: None,
            recorder: None,
            strategies: None,
        }
    }

    pub fn display(mut self, display: Arc<dyn DisplaySink>) -> Self {
        self.display = Some(display);
        self
    }

    pub fn recorder(mut self, recorder: Box<dyn RecordingSink>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Use a registry with extra plugin strategies
    pub fn strategies(mut self, registry: StrategyRegistry) -> Self {
        self.strategies = Some(registry);
        self
    }

    pub fn build<G: GraphSubsystem>(self, graph: G) -> Result<(FramePipeline<G>, PipelineBridge)> {
        let config = self.config;
        config.validate()?;

        let registry = self
            .strategies
            .unwrap_or_else(|| StrategyRegistry::from_config(&config.features));
        let builder = NodeBuilder::from_provider(&registry, &config.features)?;

        let display = self.display.unwrap_or_else(|| Arc::new(NullDisplay));
        let state = Arc::new(PipelineState::new(config.pipeline.start_paused));
        let publisher = Arc::new(ResultPublisher::new(&config.publish));

        let (recorder, recordings): (Box<dyn RecordingSink>, Option<Receiver<RecordedFrame>>) =
            match self.recorder {
                Some(recorder) => (recorder, None),
                None if config.recording.enabled => {
                    let (tap, rx) = RecordingTap::new(config.recording.queue_capacity);
                    (Box::new(tap), Some(rx))
                }
                None => (Box::new(NullRecorder), None),
            };

        let integrator =
            GraphIntegrator::spawn(graph, publisher.clone(), state.clone(), display.clone())?;
        let (bridge, sensor_rx, cmd_rx) = PipelineBridge::new(
            state.clone(),
            display.clone(),
            publisher.topics().clone(),
            recordings,
        );

        tracing::info!(
            "Pipeline ready: queue size {}, tolerance {:?}, overload budget {:?}, {:?} integration",
            config.sync.queue_size,
            config.sync.tolerance(),
            config.pipeline.overload_budget(),
            config.pipeline.integration_mode,
        );

        let pipeline = FramePipeline {
            sync: FrameSynchronizer::new(config.sync.queue_size, config.sync.tolerance()),
            normalizer: DepthNormalizer::new(config.pipeline.depth_scale),
            converter: RgbaConverter::new(),
            builder,
            guard: OverloadGuard::new(config.pipeline.overload_budget()),
            integrator,
            publisher,
            state,
            display,
            recorder,
            stats: PipelineStats::default(),
            mode: config.pipeline.integration_mode,
            min_time_reported: config.pipeline.min_time_reported(),
            sensor_rx,
            cmd_rx,
        };
        Ok((pipeline, bridge))
    }
}
