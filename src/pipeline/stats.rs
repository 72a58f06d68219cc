//! Pipeline counters.

use serde::{Deserialize, Serialize};

/// Running totals kept by the processing thread
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Frames produced by the synchronizer
    pub frames_synchronized: u64,
    /// Frames dropped by the geometry check
    pub rejected_geometry: u64,
    /// Frames displayed but not processed because the pipeline was paused
    pub skipped_paused: u64,
    pub nodes_built: u64,
    pub nodes_accepted: u64,
    pub nodes_rejected: u64,
    /// Times the overload guard paused the pipeline
    pub overloads: u64,
    /// Sensor messages the synchronizer discarded (queue overflow or stale)
    pub messages_dropped: u64,
    pub recordings_dropped: u64,
    pub clouds_published: u64,
}

impl PipelineStats {
    pub fn to_json(&self) -> crate::error::Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| crate::error::FrontendError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_contains_counters() {
        let stats = PipelineStats {
            nodes_built: 3,
            overloads: 1,
            ..Default::default()
        };
        let json = stats.to_json().unwrap();
        assert!(json.contains("\"nodes_built\": 3"));
        let back: PipelineStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }
}
