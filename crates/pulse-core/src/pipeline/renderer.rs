use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::Surface;
use super::dashboard::DashboardState;
use crate::channel::SnapshotChannel;
use crate::error::TelemetryError;
use crate::logging::LogTail;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererSettings {
    pub interval: Duration,
    /// Points kept for each chart.
    pub history_capacity: usize,
    /// Empty ticks tolerated before a waiting placeholder is shown.
    pub stall_ticks: u32,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            history_capacity: 50,
            stall_ticks: 10,
        }
    }
}

/// Redraws `surface` every tick until `cancel` fires, then hands it back.
///
/// A frame that fails or panics is replaced by an error panel; the loop keeps
/// going either way.
pub async fn run_renderer<S: Surface>(
    mut surface: S,
    channel: Arc<SnapshotChannel>,
    logs: Option<LogTail>,
    settings: RendererSettings,
    cancel: CancellationToken,
) -> S {
    tracing::info!("dashboard renderer started");
    let mut dashboard = DashboardState::new(settings.history_capacity, settings.stall_ticks);
    let mut failed_frames: u64 = 0;

    while !cancel.is_cancelled() {
        dashboard.tick(&channel);
        let view = dashboard.view(channel.len(), logs.as_ref());

        if let Err(err) = super::contain(TelemetryError::RenderFailure, || surface.draw(&view)) {
            failed_frames += 1;
            tracing::warn!(failed_frames, "dashboard frame failed: {err}");
            let message = format!("Error rendering dashboard: {err}");
            if let Err(err) =
                super::contain(TelemetryError::RenderFailure, || surface.draw_error(&message))
            {
                tracing::debug!("error panel failed: {err}");
            }
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(settings.interval) => {}
        }
    }

    tracing::info!(failed_frames, "dashboard renderer stopped");
    surface
}
