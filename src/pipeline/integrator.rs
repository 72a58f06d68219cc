//! Serialized hand-off of feature nodes to the graph subsystem.
//!
//! The graph lives on a dedicated worker thread. The ingestion path sends
//! one job at a time and keeps the completion receiver of the last job as
//! its pending handle; before dispatching again it blocks on that handle.
//! That wait is the only blocking point of the ingestion path and keeps at
//! most one integration in flight.
//!
//! ```text
//! ingestion ──job(1)──▶ graph-integrator ──report(1)──▶ ingestion
//! ```

use super::display::DisplaySink;
use super::publisher::{PublishSummary, ResultPublisher};
use super::state::PipelineState;
use crate::error::{FrontendError, Result};
use crate::graph::{AddNodeOutcome, FeatureNode, GraphSubsystem};
use crate::types::GrayImage;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Status shown while the graph is being updated
pub const STATUS_GRAPH: &str = "GraphSLAM";

/// Outcome of one integration, returned through the pending handle
#[derive(Debug)]
pub struct IntegrationReport {
    pub timestamp: Duration,
    pub accepted: bool,
    pub freshly_optimized: bool,
    /// Feature flow drawn onto a copy of the visual image (accepted nodes only)
    pub overlay: Option<GrayImage>,
    pub publications: PublishSummary,
    pub elapsed: Duration,
}

struct IntegrationJob {
    node: FeatureNode,
    canvas: GrayImage,
    done: Sender<IntegrationReport>,
}

/// Completion handle of the integration currently in flight
pub struct PendingIntegration {
    timestamp: Duration,
    done: Receiver<IntegrationReport>,
}

impl PendingIntegration {
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }
}

/// Everything the worker shares with the ingestion path
struct WorkerContext {
    publisher: Arc<ResultPublisher>,
    state: Arc<PipelineState>,
    display: Arc<dyn DisplaySink>,
    in_flight: Arc<AtomicUsize>,
}

impl WorkerContext {
    fn integrate<G: GraphSubsystem>(&self, graph: &mut G, job: IntegrationJob) {
        let IntegrationJob {
            node,
            mut canvas,
            done,
        } = job;
        let started = Instant::now();
        let timestamp = node.timestamp();
        let cloud = node.cloud().clone();

        self.display.set_status(STATUS_GRAPH);
        let accepted = match graph.add_node(node) {
            AddNodeOutcome::Accepted => true,
            AddNodeOutcome::Rejected(node) => {
                tracing::debug!(
                    "Graph rejected node {:?} ({} keypoints)",
                    timestamp,
                    node.keypoints().len()
                );
                false
            }
        };

        let overlay = if accepted {
            graph.draw_feature_flow(&mut canvas);
            Some(canvas)
        } else {
            None
        };
        let freshly_optimized = accepted && graph.freshly_optimized();
        let publications = self
            .publisher
            .publish(&*graph, &cloud, timestamp, accepted, &self.state);

        let report = IntegrationReport {
            timestamp,
            accepted,
            freshly_optimized,
            overlay,
            publications,
            elapsed: started.elapsed(),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        // The ingestion path may have shut down without waiting.
        let _ = done.send(report);
    }
}

/// Owns the integration worker and the single pending handle
pub struct GraphIntegrator<G: GraphSubsystem> {
    jobs: Option<Sender<IntegrationJob>>,
    worker: Option<JoinHandle<G>>,
    pending: Option<PendingIntegration>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl<G: GraphSubsystem> GraphIntegrator<G> {
    /// Move `graph` onto a new worker thread
    pub fn spawn(
        graph: G,
        publisher: Arc<ResultPublisher>,
        state: Arc<PipelineState>,
        display: Arc<dyn DisplaySink>,
    ) -> Result<Self> {
        let (job_tx, job_rx) = bounded::<IntegrationJob>(1);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let ctx = WorkerContext {
            publisher,
            state,
            display,
            in_flight: in_flight.clone(),
        };

        let worker = std::thread::Builder::new()
            .name("graph-integrator".to_string())
            .spawn(move || {
                let mut graph = graph;
                tracing::debug!("Integration worker started");
                for job in job_rx {
                    ctx.integrate(&mut graph, job);
                }
                tracing::debug!("Integration worker exiting");
                graph
            })?;

        Ok(Self {
            jobs: Some(job_tx),
            worker: Some(worker),
            pending: None,
            in_flight,
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Integrations dispatched and not yet finished
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest in-flight count ever observed at dispatch
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Block until the pending integration (if any) finishes
    pub fn wait_for_pending(&mut self) -> Option<IntegrationReport> {
        let pending = self.pending.take()?;
        match pending.done.recv() {
            Ok(report) => Some(report),
            Err(_) => {
                tracing::error!(
                    "Integration of node {:?} never completed; worker terminated",
                    pending.timestamp
                );
                None
            }
        }
    }

    /// Collect the pending report if it is already done, without blocking
    pub fn poll_completed(&mut self) -> Option<IntegrationReport> {
        let report = self.pending.as_ref()?.done.try_recv().ok()?;
        self.pending = None;
        Some(report)
    }

    /// Hand `node` to the graph. Waits on the previous integration first and
    /// returns its report.
    ///
    /// `canvas` is the visual image the graph may draw feature flow onto.
    pub fn dispatch(
        &mut self,
        node: FeatureNode,
        canvas: GrayImage,
    ) -> Result<Option<IntegrationReport>> {
        let previous = self.wait_for_pending();

        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| FrontendError::Channel("integrator already shut down".to_string()))?;
        let timestamp = node.timestamp();
        let (done_tx, done_rx) = bounded(1);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let job = IntegrationJob {
            node,
            canvas,
            done: done_tx,
        };
        if jobs.send(job).is_err() {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(FrontendError::Channel(
                "integration worker is not running".to_string(),
            ));
        }
        self.pending = Some(PendingIntegration {
            timestamp,
            done: done_rx,
        });
        Ok(previous)
    }

    /// Stop the worker after it finishes the pending job and hand back the graph
    pub fn shutdown(mut self) -> Option<G> {
        self.stop()
    }

    fn stop(&mut self) -> Option<G> {
        drop(self.jobs.take());
        self.pending = None;
        let worker = self.worker.take()?;
        match worker.join() {
            Ok(graph) => Some(graph),
            Err(_) => {
                tracing::error!("Integration worker panicked");
                None
            }
        }
    }
}

impl<G: GraphSubsystem> Drop for GraphIntegrator<G> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PublishConfig;
    use crate::features::Descriptors;
    use crate::pipeline::display::NullDisplay;
    use crate::types::PointCloud;
    use nalgebra::Isometry3;
    use std::sync::Mutex;

    /// Records accepted stamps and tracks concurrent `add_node` calls
    struct SlowGraph {
        accept: bool,
        delay: Duration,
        seen: Arc<Mutex<Vec<Duration>>>,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl GraphSubsystem for SlowGraph {
        fn add_node(&mut self, node: FeatureNode) -> AddNodeOutcome {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(node.timestamp());
            if self.accept {
                AddNodeOutcome::Accepted
            } else {
                AddNodeOutcome::Rejected(node)
            }
        }
        fn freshly_optimized(&self) -> bool {
            false
        }
        fn last_transform_time(&self) -> Duration {
            Duration::ZERO
        }
        fn world_to_camera(&self) -> Isometry3<f32> {
            Isometry3::identity()
        }
        fn draw_feature_flow(&self, canvas: &mut GrayImage) {
            canvas.put(0, 0, 255);
        }
    }

    fn node(ms: u64) -> FeatureNode {
        FeatureNode::new(
            Duration::from_millis(ms),
            Arc::new(PointCloud::organized(2, 2, "camera")),
            Vec::new(),
            Descriptors::Float {
                dim: 64,
                data: Vec::new(),
            },
            GrayImage::new(2, 2),
        )
    }

    fn integrator(
        accept: bool,
        delay: Duration,
    ) -> (
        GraphIntegrator<SlowGraph>,
        Arc<Mutex<Vec<Duration>>>,
        Arc<AtomicUsize>,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let peak = Arc::new(AtomicUsize::new(0));
        let graph = SlowGraph {
            accept,
            delay,
            seen: seen.clone(),
            active: Arc::new(AtomicUsize::new(0)),
            peak: peak.clone(),
        };
        let integrator = GraphIntegrator::spawn(
            graph,
            Arc::new(ResultPublisher::new(&PublishConfig::default())),
            Arc::new(PipelineState::default()),
            Arc::new(NullDisplay),
        )
        .unwrap();
        (integrator, seen, peak)
    }

    #[test]
    fn test_single_flight_and_order() {
        let (mut integrator, seen, peak) = integrator(true, Duration::from_millis(5));
        let mut reports = Vec::new();
        for ms in [10, 20, 30, 40] {
            if let Some(r) = integrator.dispatch(node(ms), GrayImage::new(2, 2)).unwrap() {
                reports.push(r.timestamp);
            }
            assert!(integrator.in_flight() <= 1);
        }
        reports.extend(integrator.wait_for_pending().map(|r| r.timestamp));

        assert_eq!(integrator.max_in_flight(), 1);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        let expected: Vec<_> = [10, 20, 30, 40].iter().map(|&m| Duration::from_millis(m)).collect();
        assert_eq!(reports, expected);
        assert_eq!(*seen.lock().unwrap(), expected);
    }

    #[test]
    fn test_accepted_node_yields_overlay() {
        let (mut integrator, _, _) = integrator(true, Duration::ZERO);
        integrator.dispatch(node(1), GrayImage::new(2, 2)).unwrap();
        let report = integrator.wait_for_pending().unwrap();
        assert!(report.accepted);
        assert_eq!(report.overlay.unwrap().get(0, 0), Some(255));
    }

    #[test]
    fn test_rejected_node_has_no_overlay() {
        let (mut integrator, _, _) = integrator(false, Duration::ZERO);
        integrator.dispatch(node(1), GrayImage::new(2, 2)).unwrap();
        let report = integrator.wait_for_pending().unwrap();
        assert!(!report.accepted);
        assert!(report.overlay.is_none());
        assert_eq!(report.publications.count(), 0);
    }

    #[test]
    fn test_shutdown_returns_graph_after_pending_job() {
        let (mut integrator, seen, _) = integrator(true, Duration::from_millis(5));
        integrator.dispatch(node(7), GrayImage::new(2, 2)).unwrap();
        let graph = integrator.shutdown().unwrap();
        assert!(graph.accept);
        assert_eq!(*seen.lock().unwrap(), vec![Duration::from_millis(7)]);
    }

    #[test]
    fn test_wait_without_pending_returns_none() {
        let (mut integrator, _, _) = integrator(true, Duration::ZERO);
        assert!(integrator.wait_for_pending().is_none());
        assert!(integrator.poll_completed().is_none());
    }
}
