//! Integration tests for the pipeline thread lifecycle
//!
//! These tests validate the complete threaded workflow:
//! - Spawning the run loop and shutting it down
//! - Synchronization of live sensor input
//! - Serialized, ordered graph integration

mod common;

use common::builders::{ConfigBuilder, FrameBuilder};
use common::{ms, wait_until};
use rgbd_frontend::config::FrontendConfig;
use rgbd_frontend::mock::{MockGraph, SyntheticRig};
use rgbd_frontend::pipeline::{FrameOutcome, FramePipeline, SensorMessage};
use rgbd_frontend::types::{DepthImage, PointCloud, Stamped};
use std::thread;
use std::time::Duration;

#[test]
fn test_pipeline_creation_and_shutdown() {
    let (pipeline, bridge) =
        FramePipeline::new(ConfigBuilder::new().build(), MockGraph::default()).unwrap();
    let handle = thread::spawn(move || pipeline.run());

    assert!(bridge.shutdown());
    let graph = handle.join().expect("pipeline thread should exit cleanly");
    assert!(graph.is_some());
}

#[test]
fn test_run_loop_integrates_rig_frames_in_order() {
    let graph = MockGraph::accepting().with_latency(ms(3));
    let probe = graph.probe();
    let (pipeline, bridge) = FramePipeline::new(ConfigBuilder::new().build(), graph).unwrap();
    let handle = thread::spawn(move || pipeline.run());

    let rig = SyntheticRig::new(64, 48);
    for i in 0..12 {
        for msg in rig.messages(i) {
            assert!(bridge.send(msg));
        }
    }
    assert!(wait_until(|| probe.offered() == 12));

    let stats = bridge.control().request_stats(Duration::from_secs(1)).unwrap();
    assert_eq!(stats.frames_synchronized, 12);
    assert_eq!(stats.nodes_built, 12);

    bridge.shutdown();
    let graph = handle.join().unwrap().unwrap();
    assert_eq!(graph.accepted_count(), 12);

    let accepted = probe.accepted();
    assert!(accepted.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(probe.peak_concurrency(), 1);
}

#[test]
fn test_dropping_bridge_stops_pipeline() {
    let (pipeline, bridge) =
        FramePipeline::new(ConfigBuilder::new().build(), MockGraph::default()).unwrap();
    let handle = thread::spawn(move || pipeline.run());
    drop(bridge);
    assert!(handle.join().unwrap().is_some());
}

#[test]
fn test_never_more_than_one_integration_in_flight() {
    let graph = MockGraph::accepting().with_latency(ms(10));
    let probe = graph.probe();
    let (mut pipeline, _bridge) = FramePipeline::new(ConfigBuilder::new().build(), graph).unwrap();

    for i in 0..6u64 {
        let outcome = pipeline.process_frame(FrameBuilder::new(ms(100 + i * 33)).build());
        assert!(outcome.is_dispatched());
        assert!(pipeline.in_flight() <= 1);
    }
    pipeline.finish_pending();

    assert_eq!(pipeline.max_in_flight(), 1);
    assert_eq!(pipeline.stats().nodes_accepted, 6);
    assert_eq!(probe.peak_concurrency(), 1);
}

#[test]
fn test_three_stream_scenario_through_pipeline() {
    let config = ConfigBuilder::new().tolerance_ms(1.0).build();
    let (mut pipeline, _bridge) = FramePipeline::new(config, MockGraph::default()).unwrap();

    let template = FrameBuilder::new(ms(0)).build();
    let visual = |t| SensorMessage::Visual(Stamped::new(ms(t), template.visual.clone()));
    let depth = |t| SensorMessage::Depth(Stamped::new(ms(t), DepthImage::filled(64, 48, 1.0)));
    let cloud = |t| {
        SensorMessage::Cloud(Stamped::new(ms(t), PointCloud::organized(64, 48, "camera")))
    };

    let arrivals = vec![
        visual(100),
        depth(100),
        cloud(100),
        visual(101),
        depth(101),
        visual(102),
        cloud(102),
        depth(103),
        cloud(104),
    ];
    let outcomes: Vec<FrameOutcome> = arrivals
        .into_iter()
        .flat_map(|msg| pipeline.push(msg))
        .collect();

    let stamps: Vec<Duration> = outcomes.iter().map(|o| o.timestamp()).collect();
    assert_eq!(stamps, vec![ms(100), ms(102)]);
    assert!(outcomes.iter().all(|o| o.is_dispatched()));
}

#[test]
fn test_geometry_mismatch_drops_frame_only() {
    let graph = MockGraph::accepting();
    let probe = graph.probe();
    let (mut pipeline, _bridge) = FramePipeline::new(ConfigBuilder::new().build(), graph).unwrap();

    let bad = pipeline.process_frame(FrameBuilder::new(ms(100)).cloud_size(48, 64).build());
    assert!(matches!(bad, FrameOutcome::GeometryRejected { .. }));
    let good = pipeline.process_frame(FrameBuilder::new(ms(133)).build());
    assert!(good.is_dispatched());
    pipeline.finish_pending();

    assert_eq!(probe.accepted(), vec![ms(133)]);
    let stats = pipeline.stats();
    assert_eq!(stats.rejected_geometry, 1);
    assert_eq!(stats.nodes_built, 1);
}

#[test]
fn test_recording_tap_receives_admitted_frames() {
    let config = ConfigBuilder::new().recording(4).start_paused(true).build();
    let (mut pipeline, bridge) = FramePipeline::new(config, MockGraph::default()).unwrap();

    pipeline.process_frame(FrameBuilder::new(ms(100)).build());
    bridge.step_one_frame();
    pipeline.process_frame(FrameBuilder::new(ms(133)).build());

    let recorded: Vec<_> = bridge.recordings().unwrap().try_iter().collect();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].frame.timestamp, ms(133));
}

#[test]
fn test_invalid_config_rejected_at_startup() {
    let mut config = FrontendConfig::default();
    config.features.adjuster_min_keypoints = 900;
    config.features.adjuster_max_keypoints = 100;
    let err = FramePipeline::new(config, MockGraph::default()).err().unwrap();
    assert!(err.is_fatal());
}

#[test]
fn test_unrepresentable_budget_rejected_at_startup() {
    let config = FrontendConfig::from_toml("[pipeline]\noverload_budget_secs = inf\n").unwrap();
    let err = FramePipeline::new(config, MockGraph::default()).err().unwrap();
    assert!(err.is_fatal());
}
