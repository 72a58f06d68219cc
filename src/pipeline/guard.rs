//! Overload protection for node construction.

use super::display::DisplaySink;
use super::state::PipelineState;
use crate::error::{FrontendError, Result};
use std::time::Duration;

/// Pauses the pipeline when building a node takes longer than the budget
#[derive(Debug, Clone, Copy)]
pub struct OverloadGuard {
    budget: Duration,
}

impl OverloadGuard {
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn check(&self, elapsed: Duration) -> Result<()> {
        if elapsed > self.budget {
            Err(FrontendError::OverloadDetected {
                elapsed,
                budget: self.budget,
            })
        } else {
            Ok(())
        }
    }

    /// Operator notice shown when the guard trips
    pub fn notice(&self) -> String {
        format!(
            "Node creation took more than {} seconds. Paused processing to prevent CPU overload",
            self.budget.as_secs_f64()
        )
    }

    /// Pause the pipeline and notify the operator if `elapsed` is over budget.
    ///
    /// The current node is not affected; it still goes to the graph.
    pub fn enforce(
        &self,
        elapsed: Duration,
        state: &PipelineState,
        display: &dyn DisplaySink,
    ) -> bool {
        match self.check(elapsed) {
            Ok(()) => false,
            Err(e) => {
                state.set_paused(true);
                display.set_info(&self.notice());
                tracing::warn!("{}; processing paused", e);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::display::{DisplayChannel, NullDisplay};
    use crate::types::RgbaImage;
    use std::sync::Mutex;

    #[derive(Default)]
    struct InfoCapture(Mutex<Vec<String>>);

    impl DisplaySink for InfoCapture {
        fn show_image(&self, _channel: DisplayChannel, _image: &RgbaImage) {}
        fn set_status(&self, _status: &str) {}
        fn set_info(&self, info: &str) {
            self.0.lock().unwrap().push(info.to_string());
        }
    }

    #[test]
    fn test_within_budget_is_ok() {
        let guard = OverloadGuard::new(Duration::from_secs(15));
        assert!(guard.check(Duration::from_secs(15)).is_ok());
        let state = PipelineState::new(false);
        assert!(!guard.enforce(Duration::from_millis(40), &state, &NullDisplay));
        assert!(!state.is_paused());
    }

    #[test]
    fn test_over_budget_pauses_and_notifies() {
        let guard = OverloadGuard::new(Duration::from_secs(15));
        let state = PipelineState::new(false);
        let display = InfoCapture::default();

        assert!(guard.enforce(Duration::from_secs(16), &state, &display));
        assert!(state.is_paused());
        let infos = display.0.lock().unwrap();
        assert_eq!(
            infos.as_slice(),
            ["Node creation took more than 15 seconds. Paused processing to prevent CPU overload"]
        );
    }

    #[test]
    fn test_check_reports_elapsed_and_budget() {
        let guard = OverloadGuard::new(Duration::from_millis(5));
        let err = guard.check(Duration::from_millis(9)).unwrap_err();
        assert!(matches!(
            err,
            FrontendError::OverloadDetected { elapsed, budget }
                if elapsed == Duration::from_millis(9) && budget == Duration::from_millis(5)
        ));
    }
}
