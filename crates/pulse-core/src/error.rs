//! Error types for the telemetry pipeline.

use thiserror::Error;

/// Failures surfaced by the tracker, the chart plotter and the pipeline stages.
///
/// Only `InvalidArgument` and `InvalidConfiguration` ever reach a caller.
/// Build and render failures are absorbed by the pipeline tasks and turned
/// into placeholder snapshots or error panels.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A caller passed a value the tracker refuses to record.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Chart configuration cannot produce a plot.
    #[error("invalid chart configuration: {0}")]
    InvalidConfiguration(String),

    /// Building a snapshot from tracker and provider state failed.
    #[error("snapshot build failed: {0}")]
    BuildFailure(String),

    /// Drawing a single frame failed.
    #[error("render failed: {0}")]
    RenderFailure(String),
}

impl TelemetryError {
    /// Wraps a build error, keeping its cause chain in the message.
    pub fn build(err: impl std::fmt::Display) -> Self {
        Self::BuildFailure(format!("{err:#}"))
    }

    pub fn render(err: impl std::fmt::Display) -> Self {
        Self::RenderFailure(format!("{err:#}"))
    }
}

pub type Result<T, E = TelemetryError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use anyhow::{Context, anyhow};

    use super::*;

    #[test]
    fn test_build_keeps_cause_chain() {
        let err = Err::<(), _>(anyhow!("connection refused"))
            .context("query worker status")
            .unwrap_err();
        assert_eq!(
            TelemetryError::build(err).to_string(),
            "snapshot build failed: query worker status: connection refused"
        );
    }
}
