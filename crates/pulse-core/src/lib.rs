//! Core pulse library: metrics tracker, snapshot pipeline, charts, config and logging.

pub mod channel;
pub mod chart;
pub mod config;
pub mod error;
pub mod format;
pub mod logging;
pub mod pipeline;
pub mod snapshot;
pub mod tracker;

pub use error::{Result, TelemetryError};
pub use snapshot::{ModelInfo, Snapshot, SnapshotBuilder, WorkerStateProvider, WorkerStatus};
pub use tracker::{MetricsTracker, SharedTracker};
