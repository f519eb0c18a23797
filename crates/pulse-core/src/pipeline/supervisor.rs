use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::builder::run_builder;
use super::renderer::run_renderer;
use super::{PipelineSettings, Surface};
use crate::channel::SnapshotChannel;
use crate::error::TelemetryError;
use crate::logging::LogTail;
use crate::snapshot::{Snapshot, SnapshotBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Owns the builder and renderer tasks.
///
/// `start` and `stop` are both idempotent. The surface travels into the
/// renderer task on start and comes back on stop, so a stopped pipeline can
/// be started again or the surface reclaimed with [`take_surface`](Self::take_surface).
pub struct PipelineSupervisor<S: Surface> {
    builder: SnapshotBuilder,
    settings: PipelineSettings,
    logs: Option<LogTail>,
    surface: Option<S>,
    state: PipelineState,
    channel: Option<Arc<SnapshotChannel>>,
    cancel: Option<CancellationToken>,
    builder_task: Option<JoinHandle<()>>,
    renderer_task: Option<JoinHandle<S>>,
}

impl<S: Surface> PipelineSupervisor<S> {
    pub fn new(builder: SnapshotBuilder, surface: S, settings: PipelineSettings) -> Self {
        Self {
            builder,
            settings,
            logs: None,
            surface: Some(surface),
            state: PipelineState::Stopped,
            channel: None,
            cancel: None,
            builder_task: None,
            renderer_task: None,
        }
    }

    /// Feeds recent log lines to the dashboard's log panel.
    #[must_use]
    pub fn with_logs(mut self, logs: LogTail) -> Self {
        self.logs = Some(logs);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == PipelineState::Running
    }

    /// The live channel while running.
    pub fn channel(&self) -> Option<&Arc<SnapshotChannel>> {
        self.channel.as_ref()
    }

    /// Reclaims the surface. Only possible while stopped.
    pub fn take_surface(&mut self) -> Option<S> {
        self.surface.take()
    }

    /// Seeds the channel and spawns the builder and renderer tasks.
    ///
    /// Does nothing when already running. The channel receives a "starting"
    /// placeholder followed by a first real snapshot when one can be built.
    ///
    /// # Errors
    /// Returns an error outside a Tokio runtime or when the surface was
    /// lost to a renderer panic.
    pub fn start(&mut self) -> Result<()> {
        if self.state != PipelineState::Stopped {
            tracing::debug!(state = ?self.state, "pipeline already started");
            return Ok(());
        }
        let runtime = tokio::runtime::Handle::try_current()
            .context("Pipeline must be started inside a Tokio runtime")?;
        let Some(surface) = self.surface.take() else {
            bail!("No dashboard surface available");
        };

        self.state = PipelineState::Starting;
        tracing::info!(
            snapshot_interval = ?self.settings.builder.interval,
            render_interval = ?self.settings.renderer.interval,
            capacity = self.settings.channel_capacity,
            "starting telemetry pipeline"
        );

        let channel = Arc::new(SnapshotChannel::new(self.settings.channel_capacity));
        channel.publish(Snapshot::placeholder("Dashboard starting..."));
        match super::contain(TelemetryError::BuildFailure, || self.builder.build()) {
            Ok(snapshot) => {
                channel.publish(snapshot);
            }
            Err(err) => tracing::debug!("initial snapshot unavailable: {err}"),
        }

        let cancel = CancellationToken::new();
        self.builder_task = Some(runtime.spawn(run_builder(
            self.builder.clone(),
            Arc::clone(&channel),
            self.settings.builder.clone(),
            cancel.clone(),
        )));
        self.renderer_task = Some(runtime.spawn(run_renderer(
            surface,
            Arc::clone(&channel),
            self.logs.clone(),
            self.settings.renderer.clone(),
            cancel.clone(),
        )));

        self.channel = Some(channel);
        self.cancel = Some(cancel);
        self.state = PipelineState::Running;
        tracing::info!("telemetry pipeline running");
        Ok(())
    }

    /// Cancels both tasks, waits for them and closes the channel.
    ///
    /// Does nothing unless running. A task that panicked is logged, not
    /// propagated.
    pub async fn stop(&mut self) {
        if self.state != PipelineState::Running {
            return;
        }
        self.state = PipelineState::Stopping;
        tracing::info!("stopping telemetry pipeline");

        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }

        if let Some(task) = self.builder_task.take()
            && let Err(err) = task.await
            && !err.is_cancelled()
        {
            tracing::error!("snapshot builder ended abnormally: {err}");
        }

        if let Some(task) = self.renderer_task.take() {
            match task.await {
                Ok(surface) => self.surface = Some(surface),
                Err(err) if err.is_cancelled() => {}
                Err(err) => tracing::error!("dashboard renderer ended abnormally: {err}"),
            }
        }

        if let Some(channel) = self.channel.take() {
            channel.close();
        }

        self.state = PipelineState::Stopped;
        tracing::info!("telemetry pipeline stopped");
    }
}

impl<S: Surface> Drop for PipelineSupervisor<S> {
    fn drop(&mut self) {
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::error::Result as TelemetryResult;
    use crate::pipeline::DashboardView;
    use crate::tracker::SharedTracker;

    #[derive(Default)]
    struct CountingSurface {
        statuses: Arc<Mutex<Vec<String>>>,
    }

    impl Surface for CountingSurface {
        fn draw(&mut self, view: &DashboardView<'_>) -> TelemetryResult<()> {
            if let Some(snapshot) = view.snapshot {
                self.statuses.lock().unwrap().push(snapshot.status_message.clone());
            }
            Ok(())
        }

        fn draw_error(&mut self, _message: &str) -> TelemetryResult<()> {
            Ok(())
        }
    }

    fn supervisor() -> (PipelineSupervisor<CountingSurface>, Arc<Mutex<Vec<String>>>) {
        let surface = CountingSurface::default();
        let statuses = Arc::clone(&surface.statuses);
        let settings = PipelineSettings::default()
            .with_intervals(Duration::from_secs(1), Duration::from_millis(500));
        let builder = SnapshotBuilder::new(SharedTracker::default());
        (PipelineSupervisor::new(builder, surface, settings), statuses)
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent_and_stop_returns_surface() {
        let (mut pipeline, statuses) = supervisor();
        assert_eq!(pipeline.state(), PipelineState::Stopped);

        pipeline.start().unwrap();
        pipeline.start().unwrap();
        assert!(pipeline.is_running());
        let channel = Arc::clone(pipeline.channel().unwrap());

        tokio::time::sleep(Duration::from_millis(1_200)).await;
        pipeline.stop().await;

        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert!(channel.is_closed());
        assert!(pipeline.channel().is_none());
        assert!(pipeline.take_surface().is_some());
        assert!(!statuses.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_frame_skips_starting_placeholder_when_build_succeeds() {
        let (mut pipeline, statuses) = supervisor();
        pipeline.start().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        pipeline.stop().await;

        let statuses = statuses.lock().unwrap();
        assert_eq!(statuses[0], "Collecting worker metrics…");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_when_stopped_is_noop() {
        let (mut pipeline, _) = supervisor();
        pipeline.stop().await;
        assert_eq!(pipeline.state(), PipelineState::Stopped);

        pipeline.start().unwrap();
        pipeline.stop().await;
        pipeline.stop().await;
        assert_eq!(pipeline.state(), PipelineState::Stopped);

        pipeline.start().unwrap();
        assert!(pipeline.is_running());
        pipeline.stop().await;
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let (mut pipeline, _) = supervisor();
        let err = pipeline.start().unwrap_err();
        assert!(err.to_string().contains("Tokio runtime"));
        assert_eq!(pipeline.state(), PipelineState::Stopped);
    }
}
