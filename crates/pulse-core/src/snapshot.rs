//! Immutable telemetry snapshots and the builder that produces them.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{Result, TelemetryError};
use crate::format::format_phase;
use crate::tracker::SharedTracker;

/// Point-in-time view handed from the builder to the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    pub run_id: Option<String>,
    pub layer: Option<u32>,
    pub activation_rate: f64,
    pub total_activations: u64,
    pub forward_count: u64,
    pub backward_count: u64,
    pub download_bytes: u64,
    pub upload_bytes: u64,
    pub latest_loss: Option<f64>,
    pub loss_average: Option<f64>,
    pub remote_epoch: Option<u64>,
    pub local_epoch: Option<u64>,
    pub hotkey: Option<String>,
    pub phase: Option<String>,
    pub status_message: String,
    pub need_to_pull_weights: bool,
    pub model_name: Option<String>,
    pub model_size: Option<String>,
    pub total_params: Option<u64>,
    /// Number of layer splits the model is partitioned into.
    pub n_layers: Option<u32>,
    pub learning_rate: Option<f64>,
}

impl Snapshot {
    /// Minimal all-defaults snapshot that only carries a status message.
    pub fn placeholder(status_message: impl Into<String>) -> Self {
        Self {
            generated_at: Utc::now(),
            run_id: None,
            layer: None,
            activation_rate: 0.0,
            total_activations: 0,
            forward_count: 0,
            backward_count: 0,
            download_bytes: 0,
            upload_bytes: 0,
            latest_loss: None,
            loss_average: None,
            remote_epoch: None,
            local_epoch: None,
            hotkey: None,
            phase: None,
            status_message: status_message.into(),
            need_to_pull_weights: false,
            model_name: None,
            model_size: None,
            total_params: None,
            n_layers: None,
            learning_rate: None,
        }
    }
}

/// Worker identity and coordination state owned by the training loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerStatus {
    pub layer: Option<u32>,
    pub run_id: Option<String>,
    pub hotkey: Option<String>,
    pub need_to_pull_weights: bool,
}

/// Model metadata used to enrich snapshots. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelInfo {
    pub model_name: Option<String>,
    pub model_size: Option<String>,
    pub total_params: Option<u64>,
    pub n_splits: Option<u32>,
    pub learning_rate: Option<f64>,
}

/// Read-only view of the training loop consumed by the snapshot builder.
///
/// A failing `worker_status` fails the whole build. A failing `model_info`
/// only leaves the enrichment fields empty.
pub trait WorkerStateProvider: Send + Sync {
    fn worker_status(&self) -> anyhow::Result<WorkerStatus>;

    fn model_info(&self) -> anyhow::Result<ModelInfo> {
        Ok(ModelInfo::default())
    }
}

/// Turns tracker state (plus the optional provider) into snapshots.
#[derive(Clone)]
pub struct SnapshotBuilder {
    tracker: SharedTracker,
    provider: Option<Arc<dyn WorkerStateProvider>>,
}

impl std::fmt::Debug for SnapshotBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotBuilder")
            .field("tracker", &self.tracker)
            .field("has_provider", &self.provider.is_some())
            .finish()
    }
}

impl SnapshotBuilder {
    pub fn new(tracker: SharedTracker) -> Self {
        Self {
            tracker,
            provider: None,
        }
    }

    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn WorkerStateProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn tracker(&self) -> &SharedTracker {
        &self.tracker
    }

    /// Builds a snapshot from the current tracker and provider state.
    ///
    /// # Errors
    /// Returns `BuildFailure` when the provider cannot report worker status.
    pub fn build(&self) -> Result<Snapshot> {
        let status = match &self.provider {
            Some(provider) => provider.worker_status().map_err(TelemetryError::build)?,
            None => WorkerStatus::default(),
        };
        let model = self.model_info();

        let mut tracker = self.tracker.write();
        let activation_rate = tracker.activation_rate();
        let loss = tracker.loss_summary();
        let phase = tracker.current_phase().map(str::to_owned);

        if phase.is_none() {
            tracing::debug!(
                layer = ?tracker.current_layer(),
                run_id = ?tracker.run_id(),
                "building snapshot without a phase"
            );
        }

        Ok(Snapshot {
            generated_at: Utc::now(),
            run_id: tracker.run_id().map(str::to_owned).or(status.run_id),
            layer: tracker.current_layer().or(status.layer),
            activation_rate,
            total_activations: tracker.total_activations(),
            forward_count: tracker.forward_count(),
            backward_count: tracker.backward_count(),
            download_bytes: tracker.download_bytes(),
            upload_bytes: tracker.upload_bytes(),
            latest_loss: loss.map(|summary| summary.latest),
            loss_average: loss.map(|summary| summary.avg),
            remote_epoch: tracker.remote_epoch(),
            local_epoch: tracker.local_epoch(),
            hotkey: status.hotkey,
            status_message: describe_status(phase.as_deref(), status.need_to_pull_weights),
            phase,
            need_to_pull_weights: status.need_to_pull_weights,
            model_name: model.model_name,
            model_size: model.model_size,
            total_params: model.total_params,
            n_layers: model.n_splits,
            learning_rate: model.learning_rate,
        })
    }

    fn model_info(&self) -> ModelInfo {
        let Some(provider) = &self.provider else {
            return ModelInfo::default();
        };
        provider.model_info().unwrap_or_else(|err| {
            tracing::debug!("model info unavailable: {err:#}");
            ModelInfo::default()
        })
    }
}

/// Human-readable status line for a snapshot.
pub fn describe_status(phase: Option<&str>, need_to_pull_weights: bool) -> String {
    let mut parts = Vec::new();
    if let Some(phase) = phase.filter(|phase| !phase.is_empty()) {
        parts.push(format!("Phase {}", format_phase(Some(phase))));
    }
    if need_to_pull_weights {
        parts.push("Needs weight pull".to_string());
    }
    if parts.is_empty() {
        return "Collecting worker metrics…".to_string();
    }
    parts.join(" · ")
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;
    use crate::tracker::MetricsTracker;

    struct FixedProvider;

    impl WorkerStateProvider for FixedProvider {
        fn worker_status(&self) -> anyhow::Result<WorkerStatus> {
            Ok(WorkerStatus {
                layer: Some(7),
                run_id: Some("provider-run".into()),
                hotkey: Some("5F3sa2TJAWMqDhXG6jhV4N8ko9SxwGy8TpaNS1repo5EYjQX".into()),
                need_to_pull_weights: true,
            })
        }

        fn model_info(&self) -> anyhow::Result<ModelInfo> {
            Ok(ModelInfo {
                model_name: Some("llama-1b".into()),
                model_size: Some("1B".into()),
                total_params: Some(1_100_000_000),
                n_splits: Some(4),
                learning_rate: Some(3e-4),
            })
        }
    }

    struct BrokenModelProvider;

    impl WorkerStateProvider for BrokenModelProvider {
        fn worker_status(&self) -> anyhow::Result<WorkerStatus> {
            Ok(WorkerStatus::default())
        }

        fn model_info(&self) -> anyhow::Result<ModelInfo> {
            Err(anyhow!("metadata not loaded"))
        }
    }

    struct DownProvider;

    impl WorkerStateProvider for DownProvider {
        fn worker_status(&self) -> anyhow::Result<WorkerStatus> {
            Err(anyhow!("state manager offline"))
        }
    }

    #[test]
    fn test_build_copies_tracker_fields() {
        let tracker = SharedTracker::new(MetricsTracker::default());
        {
            let mut t = tracker.write();
            t.record_forward();
            t.record_forward();
            t.record_backward();
            t.record_download(2048).unwrap();
            t.record_loss(2.0);
            t.record_loss(4.0);
            t.set_phase(Some("LayerPhase.TRAINING"));
            t.set_layer(Some(2));
            t.set_remote_epoch(Some(11));
        }

        let snapshot = SnapshotBuilder::new(tracker).build().unwrap();
        assert_eq!(snapshot.total_activations, 3);
        assert_eq!(snapshot.forward_count, 2);
        assert_eq!(snapshot.backward_count, 1);
        assert_eq!(snapshot.download_bytes, 2048);
        assert_eq!(snapshot.latest_loss, Some(4.0));
        assert_eq!(snapshot.loss_average, Some(3.0));
        assert_eq!(snapshot.layer, Some(2));
        assert_eq!(snapshot.remote_epoch, Some(11));
        assert_eq!(snapshot.status_message, "Phase Training");
        assert!(snapshot.activation_rate > 0.0);
        assert_eq!(snapshot.model_name, None);
    }

    #[test]
    fn test_build_falls_back_to_provider_identity() {
        let tracker = SharedTracker::default();
        let builder = SnapshotBuilder::new(tracker.clone()).with_provider(Arc::new(FixedProvider));

        let snapshot = builder.build().unwrap();
        assert_eq!(snapshot.layer, Some(7));
        assert_eq!(snapshot.run_id.as_deref(), Some("provider-run"));
        assert_eq!(snapshot.n_layers, Some(4));
        assert_eq!(snapshot.total_params, Some(1_100_000_000));
        assert_eq!(snapshot.status_message, "Needs weight pull");

        tracker.write().set_layer(Some(1));
        tracker.write().set_run_id(Some("tracker-run"));
        let snapshot = builder.build().unwrap();
        assert_eq!(snapshot.layer, Some(1));
        assert_eq!(snapshot.run_id.as_deref(), Some("tracker-run"));
    }

    #[test]
    fn test_model_info_failure_leaves_fields_empty() {
        let builder =
            SnapshotBuilder::new(SharedTracker::default()).with_provider(Arc::new(BrokenModelProvider));
        let snapshot = builder.build().unwrap();
        assert_eq!(snapshot.model_name, None);
        assert_eq!(snapshot.learning_rate, None);
    }

    #[test]
    fn test_worker_status_failure_is_build_failure() {
        let builder =
            SnapshotBuilder::new(SharedTracker::default()).with_provider(Arc::new(DownProvider));
        let err = builder.build().unwrap_err();
        assert!(matches!(err, TelemetryError::BuildFailure(_)));
        assert!(err.to_string().contains("state manager offline"));
    }

    #[test]
    fn test_describe_status() {
        assert_eq!(describe_status(None, false), "Collecting worker metrics…");
        assert_eq!(
            describe_status(Some("MERGING_PARTITIONS"), true),
            "Phase Merging Partitions · Needs weight pull"
        );
    }
}
