//! Error types for the metrics facade.
//!

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by configuration, lifecycle and instrument construction.
///
/// `Clone` so that the outcome of a one-shot operation can be handed to every
/// caller that awaited it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricsError {
    #[error("invalid OTLP metrics config: {0}")]
    Configuration(String),
    #[error("failed to create OTLP exporter: {0}")]
    Exporter(String),
    #[error("failed to create instrument {name}: {reason}")]
    Instrument { name: String, reason: String },
    #[error("metrics shutdown failed: {0}")]
    Shutdown(String),
    #[error("metrics shutdown did not complete within {0:?}")]
    ShutdownTimeout(Duration),
}

impl MetricsError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn instrument(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Instrument {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// True for errors raised before any global state was touched.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

pub type MetricsResult<T> = std::result::Result<T, MetricsError>;
