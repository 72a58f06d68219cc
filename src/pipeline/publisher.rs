//! Outbound point-cloud topics.
//!
//! A [`CloudTopic`] fans a published cloud out to every live subscription.
//! Subscriptions unregister themselves when dropped, and publishing to a
//! topic with no subscribers does nothing at all.
//!
//! [`ResultPublisher`] decides what goes out after each integration:
//!
//! | Topic       | When                              | Payload                        |
//! |-------------|-----------------------------------|--------------------------------|
//! | reframed    | accepted, graph freshly optimized | original points, slam frame id |
//! | transformed | accepted, graph freshly optimized | points moved into fixed frame  |
//! | reference   | first accepted node only          | original cloud                 |

use super::state::PipelineState;
use crate::config::PublishConfig;
use crate::graph::GraphSubsystem;
use crate::types::PointCloud;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

/// A cloud as delivered to subscribers
#[derive(Debug, Clone)]
pub struct StampedCloud {
    pub timestamp: Duration,
    pub frame_id: String,
    pub cloud: Arc<PointCloud>,
}

/// Receiving end of a topic. Dropping it unsubscribes.
pub struct CloudSubscription {
    receiver: Receiver<StampedCloud>,
    _token: Arc<()>,
}

impl CloudSubscription {
    pub fn receiver(&self) -> &Receiver<StampedCloud> {
        &self.receiver
    }

    pub fn try_recv(&self) -> Option<StampedCloud> {
        self.receiver.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<StampedCloud> {
        self.receiver.recv_timeout(timeout).ok()
    }

    pub fn drain(&self) -> Vec<StampedCloud> {
        self.receiver.try_iter().collect()
    }
}

struct Subscriber {
    token: Weak<()>,
    tx: Sender<StampedCloud>,
}

/// A named fan-out channel for clouds
pub struct CloudTopic {
    name: String,
    subscribers: Mutex<Vec<Subscriber>>,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl CloudTopic {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscribers: Mutex::new(Vec::new()),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A publish only ever fails one subscriber, so a poisoned lock is still usable
    fn lock(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a subscriber whose queue holds at most `capacity` clouds
    pub fn subscribe(&self, capacity: usize) -> CloudSubscription {
        let (tx, receiver) = bounded(capacity.max(1));
        let token = Arc::new(());
        self.lock().push(Subscriber {
            token: Arc::downgrade(&token),
            tx,
        });
        tracing::debug!("New subscriber on {}", self.name);
        CloudSubscription {
            receiver,
            _token: token,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subs = self.lock();
        subs.retain(|s| s.token.strong_count() > 0);
        subs.len()
    }

    pub fn has_subscribers(&self) -> bool {
        self.subscriber_count() > 0
    }

    /// Deliver `cloud` to every live subscriber. Returns how many received it.
    ///
    /// A subscriber with a full queue misses this cloud.
    pub fn publish(&self, cloud: StampedCloud) -> usize {
        let mut subs = self.lock();
        subs.retain(|s| s.token.strong_count() > 0);
        let mut delivered = 0;
        for sub in subs.iter() {
            match sub.tx.try_send(cloud.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
        if delivered > 0 {
            self.published.fetch_add(1, Ordering::Relaxed);
        }
        delivered
    }

    /// Clouds delivered to at least one subscriber
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Per-subscriber deliveries lost to a full queue
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for CloudTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudTopic")
            .field("name", &self.name)
            .field("published", &self.published())
            .finish()
    }
}

/// The three outbound topics
#[derive(Debug, Clone)]
pub struct PublisherTopics {
    pub reframed: Arc<CloudTopic>,
    pub transformed: Arc<CloudTopic>,
    pub reference: Arc<CloudTopic>,
}

impl PublisherTopics {
    pub fn new(config: &PublishConfig) -> Self {
        Self {
            reframed: Arc::new(CloudTopic::new(config.reframed_topic.clone())),
            transformed: Arc::new(CloudTopic::new(config.transformed_topic.clone())),
            reference: Arc::new(CloudTopic::new(config.reference_topic.clone())),
        }
    }
}

/// Which topics received something after one integration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub reframed: bool,
    pub transformed: bool,
    pub reference: bool,
}

impl PublishSummary {
    pub fn count(&self) -> u64 {
        self.reframed as u64 + self.transformed as u64 + self.reference as u64
    }
}

/// Publishes integration results to the outbound topics
pub struct ResultPublisher {
    topics: PublisherTopics,
    slam_frame_id: String,
    fixed_frame_id: String,
    transforms_computed: AtomicU64,
}

impl ResultPublisher {
    pub fn new(config: &PublishConfig) -> Self {
        Self::with_topics(PublisherTopics::new(config), config)
    }

    pub fn with_topics(topics: PublisherTopics, config: &PublishConfig) -> Self {
        Self {
            topics,
            slam_frame_id: config.slam_frame_id.clone(),
            fixed_frame_id: config.fixed_frame_id.clone(),
            transforms_computed: AtomicU64::new(0),
        }
    }

    pub fn topics(&self) -> &PublisherTopics {
        &self.topics
    }

    /// Full point transforms computed so far
    pub fn transforms_computed(&self) -> u64 {
        self.transforms_computed.load(Ordering::Relaxed)
    }

    /// Publish after an integration of the node stamped `timestamp`.
    ///
    /// Nothing is published for a rejected node.
    pub fn publish<G: GraphSubsystem + ?Sized>(
        &self,
        graph: &G,
        cloud: &Arc<PointCloud>,
        timestamp: Duration,
        accepted: bool,
        state: &PipelineState,
    ) -> PublishSummary {
        let mut summary = PublishSummary::default();
        if !accepted {
            return summary;
        }

        if graph.freshly_optimized() {
            if self.topics.reframed.has_subscribers() {
                let reframed = StampedCloud {
                    timestamp: graph.last_transform_time(),
                    frame_id: self.slam_frame_id.clone(),
                    cloud: cloud.clone(),
                };
                summary.reframed = self.topics.reframed.publish(reframed) > 0;
            }

            if self.topics.transformed.has_subscribers() {
                let transform = graph.world_to_camera();
                let moved = cloud.transformed(&transform, self.fixed_frame_id.clone());
                self.transforms_computed.fetch_add(1, Ordering::Relaxed);
                let transformed = StampedCloud {
                    timestamp: graph.last_transform_time(),
                    frame_id: self.fixed_frame_id.clone(),
                    cloud: Arc::new(moved),
                };
                summary.transformed = self.topics.transformed.publish(transformed) > 0;
            }
        }

        if !state.first_frame_sent() && self.topics.reference.has_subscribers() {
            let reference = StampedCloud {
                timestamp,
                frame_id: cloud.frame_id.clone(),
                cloud: cloud.clone(),
            };
            if self.topics.reference.publish(reference) > 0 && state.mark_first_frame_sent() {
                summary.reference = true;
                tracing::info!("Published reference cloud at {:?}", timestamp);
            }
        }

        summary
    }
}
