//! Playback state shared between the pipeline thread, the integration
//! worker and control handles.

use std::sync::atomic::{AtomicBool, Ordering};

/// What the playback gate decided for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Paused, but a single step was requested and has now been consumed
    Stepped,
    /// Not paused
    Running,
    /// Paused with no pending step; the frame is displayed only
    Paused,
}

impl Admission {
    pub fn admitted(self) -> bool {
        !matches!(self, Admission::Paused)
    }
}

/// Pause, single-step and first-frame flags.
///
/// Each flag is an independent atomic, so control handles never block the
/// processing thread.
#[derive(Debug, Default)]
pub struct PipelineState {
    paused: AtomicBool,
    step_requested: AtomicBool,
    first_frame_sent: AtomicBool,
}

impl PipelineState {
    pub fn new(start_paused: bool) -> Self {
        Self {
            paused: AtomicBool::new(start_paused),
            ..Self::default()
        }
    }

    /// Flip the pause flag, returning the new value
    pub fn toggle_pause(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Admit exactly one more frame. Repeated requests before the next
    /// frame collapse into one.
    pub fn request_step(&self) {
        self.step_requested.store(true, Ordering::SeqCst);
    }

    pub fn step_pending(&self) -> bool {
        self.step_requested.load(Ordering::SeqCst)
    }

    /// Decide whether the current frame may go past the playback gate.
    ///
    /// A pending step is consumed whether or not the pipeline is paused.
    pub fn admit(&self) -> Admission {
        let stepped = self.step_requested.swap(false, Ordering::SeqCst);
        if !self.is_paused() {
            Admission::Running
        } else if stepped {
            Admission::Stepped
        } else {
            Admission::Paused
        }
    }

    pub fn first_frame_sent(&self) -> bool {
        self.first_frame_sent.load(Ordering::SeqCst)
    }

    /// Returns true only for the caller that set the flag
    pub fn mark_first_frame_sent(&self) -> bool {
        !self.first_frame_sent.swap(true, Ordering::SeqCst)
    }
}
