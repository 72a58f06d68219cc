//! RGB-D front-end demo entry point
//!
//! Runs the full pipeline against the synthetic sensor rig and an in-memory
//! graph, then prints the pipeline statistics.
//!
//! Usage: `rgbd-frontend [CONFIG.toml] [FRAMES]`

use anyhow::{anyhow, Context};
use rgbd_frontend::{
    config::{FrontendConfig, LoggingConfig},
    mock::{MockGraph, SyntheticRig},
    pipeline::{LogDisplay, PipelineBuilder},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FRAMES: u64 = 90;

fn init_tracing(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let (file_layer, guard) = match &logging.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "rgbd-frontend.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,rgbd_frontend=debug")),
        )
        .with(fmt::layer())
        .with(file_layer)
        .init();
    guard
}

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let config_path = args.next().map(PathBuf::from);
    let frames = args
        .next()
        .map(|s| s.parse::<u64>())
        .transpose()
        .context("frame count must be a non-negative integer")?
        .unwrap_or(DEFAULT_FRAMES);

    let config = match &config_path {
        Some(path) => FrontendConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => FrontendConfig::load_or_default(),
    };

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_tracing(&config.logging);
    tracing::info!("Starting RGB-D front-end with {} synthetic frames", frames);

    let graph = MockGraph::accepting().reoptimize_every(3);
    let probe = graph.probe();
    let (pipeline, bridge) = PipelineBuilder::new(config)
        .display(Arc::new(LogDisplay))
        .build(graph)
        .context("Failed to build the frame pipeline")?;
    let reframed = bridge.topics().reframed.subscribe(8);
    let control = bridge.control();

    let pipeline_handle = std::thread::Builder::new()
        .name("frame-pipeline".to_string())
        .spawn(move || pipeline.run())
        .context("Failed to spawn the pipeline thread")?;

    let rig = SyntheticRig::default();
    let period = rig.timestamp(1);
    'feed: for index in 0..frames {
        for msg in rig.messages(index) {
            if !bridge.send(msg) {
                tracing::warn!("Pipeline stopped accepting input at frame {}", index);
                break 'feed;
            }
        }
        std::thread::sleep(period);
    }

    if let Some(stats) = control.request_stats(Duration::from_secs(1)) {
        tracing::info!("Statistics before shutdown: {:?}", stats);
    }

    tracing::info!("Shutting down...");
    control.shutdown();
    let graph = pipeline_handle
        .join()
        .map_err(|_| anyhow!("pipeline thread panicked"))?
        .ok_or_else(|| anyhow!("graph was lost in the integration worker"))?;

    tracing::info!(
        "{} nodes accepted ({} offered), {} reframed clouds received",
        graph.accepted_count(),
        probe.offered(),
        reframed.drain().len()
    );
    Ok(())
}
