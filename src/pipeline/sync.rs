//! Approximate-time synchronization of the three input streams.
//!
//! Each stream has a bounded queue (`queue_size`, oldest dropped first).
//! A frame is formed as soon as every queue is non-empty and the heads can
//! be matched:
//!
//! 1. The pivot is the latest head (ties resolved Visual, Depth, Cloud).
//! 2. Elements of the other streams older than `pivot - tolerance` can
//!    never match anything again and are discarded.
//! 3. For every other stream the queued element nearest the pivot within
//!    `±tolerance` is chosen; equal distances go to the earlier element.
//! 4. If the chosen set spreads wider than `tolerance`, the heads are used
//!    instead (they are always within the window after step 2).
//!
//! The synchronizer never waits for a better candidate, so a frame is emitted
//! as early as possible. Elements that never find partners are dropped
//! silently. Emitted frames carry the cloud timestamp, which strictly
//! increases.

use crate::pipeline::frame::{SensorFrame, SensorMessage};
use crate::types::{DepthImage, GrayImage, PointCloud, Stamped, StreamRole};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

pub struct FrameSynchronizer {
    queue_size: usize,
    tolerance: Duration,
    visual: VecDeque<Stamped<GrayImage>>,
    depth: VecDeque<Stamped<DepthImage>>,
    cloud: VecDeque<Stamped<Arc<PointCloud>>>,
    last_consumed: [Option<Duration>; 3],
    dropped: u64,
    out_of_order: u64,
}

impl FrameSynchronizer {
    pub fn new(queue_size: usize, tolerance: Duration) -> Self {
        let queue_size = queue_size.max(1);
        Self {
            queue_size,
            tolerance,
            visual: VecDeque::with_capacity(queue_size + 1),
            depth: VecDeque::with_capacity(queue_size + 1),
            cloud: VecDeque::with_capacity(queue_size + 1),
            last_consumed: [None; 3],
            dropped: 0,
            out_of_order: 0,
        }
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Elements discarded without ever being part of a frame
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Elements refused because they were not newer than their stream's last one
    pub fn out_of_order(&self) -> u64 {
        self.out_of_order
    }

    pub fn queued(&self, role: StreamRole) -> usize {
        match role {
            StreamRole::Visual => self.visual.len(),
            StreamRole::Depth => self.depth.len(),
            StreamRole::Cloud => self.cloud.len(),
        }
    }

    /// Buffer one stream element. Returns `false` if it was refused.
    pub fn push(&mut self, message: SensorMessage) -> bool {
        let role = message.role();
        let stamp = message.timestamp();
        let newest = self.stamp_at(role, self.queued(role).wrapping_sub(1));
        if newest.or(self.last_consumed[role.index()]).is_some_and(|t| stamp <= t) {
            self.out_of_order += 1;
            tracing::debug!("Refusing out-of-order {} element at {:?}", role, stamp);
            return false;
        }

        match message {
            SensorMessage::Visual(m) => self.visual.push_back(m),
            SensorMessage::Depth(m) => self.depth.push_back(m),
            SensorMessage::Cloud(m) => self
                .cloud
                .push_back(Stamped::new(m.timestamp, Arc::new(m.payload))),
        }
        if self.queued(role) > self.queue_size {
            self.pop_front(role);
            self.dropped += 1;
        }
        true
    }

    /// Emit the next correlated frame, if the queues allow one
    pub fn pop_frame(&mut self) -> Option<SensorFrame> {
        loop {
            let mut heads = [Duration::ZERO; 3];
            for role in StreamRole::ALL {
                heads[role.index()] = self.stamp_at(role, 0)?;
            }

            let mut pivot_role = StreamRole::Visual;
            for role in StreamRole::ALL {
                if heads[role.index()] > heads[pivot_role.index()] {
                    pivot_role = role;
                }
            }
            let pivot = heads[pivot_role.index()];
            let lower = pivot.saturating_sub(self.tolerance);

            let mut discarded = false;
            for role in StreamRole::ALL {
                while self.stamp_at(role, 0).is_some_and(|t| t < lower) {
                    self.pop_front(role);
                    self.dropped += 1;
                    discarded = true;
                }
            }
            if discarded {
                continue;
            }

            let mut chosen = [0usize; 3];
            for role in StreamRole::ALL {
                if role != pivot_role {
                    chosen[role.index()] = self.nearest(role, pivot);
                }
            }
            let picked: Vec<Duration> = StreamRole::ALL
                .iter()
                .filter_map(|&r| self.stamp_at(r, chosen[r.index()]))
                .collect();
            let spread = picked.iter().max().copied().unwrap_or(pivot)
                - picked.iter().min().copied().unwrap_or(pivot);
            if spread > self.tolerance {
                chosen = [0; 3];
            }

            return self.take_frame(chosen);
        }
    }

    /// Lazily yield every frame the buffered elements can form
    pub fn drain_frames(&mut self) -> impl Iterator<Item = SensorFrame> + '_ {
        std::iter::from_fn(move || self.pop_frame())
    }

    /// Drop everything buffered and forget consumed stamps, so a restarted
    /// rig whose clock begins again from zero is accepted
    pub fn clear(&mut self) {
        self.visual.clear();
        self.depth.clear();
        self.cloud.clear();
        self.last_consumed = [None; 3];
    }

    fn stamp_at(&self, role: StreamRole, i: usize) -> Option<Duration> {
        match role {
            StreamRole::Visual => self.visual.get(i).map(|m| m.timestamp),
            StreamRole::Depth => self.depth.get(i).map(|m| m.timestamp),
            StreamRole::Cloud => self.cloud.get(i).map(|m| m.timestamp),
        }
    }

    fn pop_front(&mut self, role: StreamRole) {
        match role {
            StreamRole::Visual => {
                self.visual.pop_front();
            }
            StreamRole::Depth => {
                self.depth.pop_front();
            }
            StreamRole::Cloud => {
                self.cloud.pop_front();
            }
        }
    }

    /// Index of the element nearest `pivot` within tolerance (head if none)
    fn nearest(&self, role: StreamRole, pivot: Duration) -> usize {
        let mut best: Option<(usize, Duration)> = None;
        for i in 0..self.queued(role) {
            let Some(t) = self.stamp_at(role, i) else {
                break;
            };
            let distance = if t > pivot { t - pivot } else { pivot - t };
            if distance > self.tolerance {
                continue;
            }
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((i, distance));
            }
        }
        best.map_or(0, |(i, _)| i)
    }

    fn take_frame(&mut self, chosen: [usize; 3]) -> Option<SensorFrame> {
        for role in StreamRole::ALL {
            for _ in 0..chosen[role.index()] {
                self.pop_front(role);
                self.dropped += 1;
            }
        }
        let visual = self.visual.pop_front()?;
        let depth = self.depth.pop_front()?;
        let cloud = self.cloud.pop_front()?;
        self.last_consumed = [
            Some(visual.timestamp),
            Some(depth.timestamp),
            Some(cloud.timestamp),
        ];
        Some(SensorFrame::new(visual, depth, cloud))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn visual(t: u64) -> SensorMessage {
        SensorMessage::Visual(Stamped::new(ms(t), GrayImage::new(2, 2)))
    }

    fn depth(t: u64) -> SensorMessage {
        SensorMessage::Depth(Stamped::new(ms(t), DepthImage::new(2, 2)))
    }

    fn cloud(t: u64) -> SensorMessage {
        SensorMessage::Cloud(Stamped::new(ms(t), PointCloud::organized(2, 2, "camera")))
    }

    fn stamps(frame: &SensorFrame) -> (u64, u64, u64) {
        let to_ms = |d: Duration| d.as_millis() as u64;
        (
            to_ms(frame.stamp(StreamRole::Visual)),
            to_ms(frame.stamp(StreamRole::Depth)),
            to_ms(frame.stamp(StreamRole::Cloud)),
        )
    }

    #[test]
    fn test_three_stream_scenario_batch() {
        let mut sync = FrameSynchronizer::new(3, ms(1));
        for t in [100, 101, 102] {
            sync.push(visual(t));
        }
        for t in [100, 101, 103] {
            sync.push(depth(t));
        }
        for t in [100, 102, 104] {
            sync.push(cloud(t));
        }
        let frames: Vec<_> = sync.drain_frames().map(|f| stamps(&f)).collect();
        assert_eq!(frames, vec![(100, 100, 100), (102, 101, 102)]);
    }

    #[test]
    fn test_three_stream_scenario_live_arrival() {
        let mut sync = FrameSynchronizer::new(3, ms(1));
        let mut frames = Vec::new();
        let arrivals = [
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
        for msg in arrivals {
            sync.push(msg);
            frames.extend(sync.drain_frames().map(|f| stamps(&f)));
        }
        assert_eq!(frames, vec![(100, 100, 100), (102, 101, 102)]);
    }

    #[test]
    fn test_nearest_candidate_wins() {
        let mut sync = FrameSynchronizer::new(5, ms(10));
        sync.push(visual(95));
        sync.push(visual(104));
        sync.push(depth(100));
        sync.push(cloud(105));
        let frame = sync.pop_frame().unwrap();
        // Pivot is the cloud at 105; visual 104 is nearer than 95.
        assert_eq!(stamps(&frame), (104, 100, 105));
    }

    #[test]
    fn test_queue_is_bounded() {
        let mut sync = FrameSynchronizer::new(2, ms(1));
        for t in 0..10 {
            sync.push(visual(t * 100));
        }
        assert_eq!(sync.queued(StreamRole::Visual), 2);
        assert_eq!(sync.dropped(), 8);
    }

    #[test]
    fn test_out_of_order_element_refused() {
        let mut sync = FrameSynchronizer::new(3, ms(1));
        assert!(sync.push(visual(50)));
        assert!(!sync.push(visual(50)));
        assert!(!sync.push(visual(40)));
        assert_eq!(sync.out_of_order(), 2);
    }

    #[test]
    fn test_consumed_stamps_cannot_return() {
        let mut sync = FrameSynchronizer::new(3, ms(1));
        sync.push(visual(10));
        sync.push(depth(10));
        sync.push(cloud(10));
        assert!(sync.pop_frame().is_some());
        assert!(!sync.push(cloud(10)));
        assert!(sync.push(cloud(11)));
    }

    #[test]
    fn test_clear_accepts_restarted_clock() {
        let mut sync = FrameSynchronizer::new(3, ms(1));
        sync.push(visual(500));
        sync.push(depth(500));
        sync.push(cloud(500));
        assert!(sync.pop_frame().is_some());
        sync.push(visual(533));

        sync.clear();
        assert_eq!(sync.queued(StreamRole::Visual), 0);
        assert!(sync.push(visual(10)));
        assert!(sync.push(depth(10)));
        assert!(sync.push(cloud(10)));
        let frame = sync.pop_frame().unwrap();
        assert_eq!(stamps(&frame), (10, 10, 10));
    }

    proptest! {
        #[test]
        fn prop_triple_within_tolerance_emits_one_frame(
            base in 1_000u64..1_000_000,
            dv in 0u64..=20,
            dd in 0u64..=20,
            dc in 0u64..=20,
        ) {
            let mut sync = FrameSynchronizer::new(3, ms(20));
            sync.push(visual(base + dv));
            sync.push(depth(base + dd));
            sync.push(cloud(base + dc));
            let frames: Vec<_> = sync.drain_frames().collect();
            prop_assert_eq!(frames.len(), 1);
            prop_assert_eq!(stamps(&frames[0]), (base + dv, base + dd, base + dc));
        }

        #[test]
        fn prop_triple_outside_tolerance_emits_nothing(
            base in 1_000u64..1_000_000,
            offsets in prop::array::uniform3(0u64..200),
        ) {
            let spread = offsets.iter().max().unwrap() - offsets.iter().min().unwrap();
            prop_assume!(spread > 20);
            let mut sync = FrameSynchronizer::new(3, ms(20));
            sync.push(visual(base + offsets[0]));
            sync.push(depth(base + offsets[1]));
            sync.push(cloud(base + offsets[2]));
            prop_assert_eq!(sync.drain_frames().count(), 0);
        }

        #[test]
        fn prop_emitted_frames_are_ordered(
            steps in prop::collection::vec((0u8..3, 1u64..15), 1..80),
        ) {
            let mut sync = FrameSynchronizer::new(3, ms(5));
            let mut clocks = [0u64; 3];
            let mut last = None;
            for (role, gap) in steps {
                clocks[role as usize] += gap;
                let t = clocks[role as usize];
                let msg = match role {
                    0 => visual(t),
                    1 => depth(t),
                    _ => cloud(t),
                };
                sync.push(msg);
                for frame in sync.drain_frames() {
                    if let Some(prev) = last {
                        prop_assert!(frame.timestamp > prev);
                    }
                    last = Some(frame.timestamp);
                }
            }
        }
    }
}
