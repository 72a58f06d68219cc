//! Error handling for the RGB-D front-end
//!
//! This module defines the error taxonomy shared by every pipeline stage
//! and a Result alias for use throughout the crate.
//!
//! Per-frame errors ([`FrontendError::FrameGeometryMismatch`],
//! [`FrontendError::OverloadDetected`]) are contained inside the frame that
//! raised them. Only [`FrontendError::StrategyConstruction`] and configuration
//! errors escape, and only at startup.

use crate::features::StrategyKind;
use std::time::Duration;
use thiserror::Error;

/// Main error type for front-end operations
#[derive(Error, Debug)]
pub enum FrontendError {
    /// The three sources of a synchronized frame disagree on width/height
    #[error(
        "PointCloud, depth and visual image differ in size \
         (visual {}x{}, depth {}x{}, cloud {}x{})",
        visual.0, visual.1, depth.0, depth.1, cloud.0, cloud.1
    )]
    FrameGeometryMismatch {
        visual: (u32, u32),
        depth: (u32, u32),
        cloud: (u32, u32),
    },

    /// A feature strategy could not be built; the pipeline cannot run
    #[error("Failed to construct {kind} '{name}': {reason}")]
    StrategyConstruction {
        kind: StrategyKind,
        name: String,
        reason: String,
    },

    /// Node construction exceeded the configured time budget
    #[error("Node creation took {elapsed:?}, exceeding the {budget:?} budget")]
    OverloadDetected { elapsed: Duration, budget: Duration },

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<FrontendError>,
    },
}

impl FrontendError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        FrontendError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error must abort startup rather than drop a single frame
    pub fn is_fatal(&self) -> bool {
        match self {
            FrontendError::StrategyConstruction { .. } | FrontendError::Config(_) => true,
            FrontendError::WithContext { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}

/// Result type alias for front-end operations
pub type Result<T> = std::result::Result<T, FrontendError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
