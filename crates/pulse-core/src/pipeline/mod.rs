//! Snapshot pipeline: builder task → drop-oldest channel → renderer task.
//!
//! ## Module Structure
//!
//! - `builder.rs`: periodic snapshot builder with consecutive-error backoff
//! - `dashboard.rs`: renderer-side state (current snapshot, rolling histories, stall detection)
//! - `renderer.rs`: periodic renderer that drives a [`Surface`]
//! - `supervisor.rs`: start/stop lifecycle of both tasks
//!
//! Neither task lets a failure escape. Build failures become placeholder
//! snapshots, frame failures become an error panel for that frame. Panics in
//! a provider or surface are caught and handled the same way.

mod builder;
mod dashboard;
mod renderer;
mod supervisor;

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

pub use builder::{BuildBackoff, BuilderSettings, run_builder};
pub use dashboard::{DashboardState, DashboardView, TickOutcome};
pub use renderer::{RendererSettings, run_renderer};
pub use supervisor::{PipelineState, PipelineSupervisor};

use crate::config::PulseConfig;
use crate::error::{Result, TelemetryError};

thread_local! {
    static CONTAINING: Cell<bool> = const { Cell::new(false) };
}

/// True while the current thread runs a pipeline stage whose panics are caught.
///
/// Panic hooks check this to leave the terminal alone for panics that end up
/// as a placeholder snapshot or an error panel.
pub fn panic_is_contained() -> bool {
    CONTAINING.with(Cell::get)
}

/// Runs one stage, converting a panic into `to_error`.
pub(crate) fn contain<T>(
    to_error: fn(String) -> TelemetryError,
    stage: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let outer = CONTAINING.replace(true);
    let result = panic::catch_unwind(AssertUnwindSafe(stage));
    CONTAINING.set(outer);
    result.unwrap_or_else(|payload| Err(to_error(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str));
    match detail {
        Some(detail) => format!("panicked: {detail}"),
        None => "panicked".to_string(),
    }
}

/// Drawing target for the renderer task.
///
/// Implementations report failures instead of panicking; the renderer then
/// falls back to [`Surface::draw_error`] for that frame.
pub trait Surface: Send + 'static {
    /// Draws the full dashboard.
    ///
    /// # Errors
    /// Returns `RenderFailure` when the frame cannot be produced.
    fn draw(&mut self, view: &DashboardView<'_>) -> Result<()>;

    /// Draws a single-line error panel in place of the dashboard.
    ///
    /// # Errors
    /// Returns `RenderFailure` when even the error panel cannot be drawn.
    fn draw_error(&mut self, message: &str) -> Result<()>;
}

/// Timing and sizing for both pipeline tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub builder: BuilderSettings,
    pub renderer: RendererSettings,
    pub channel_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&PulseConfig::default())
    }
}

impl From<&PulseConfig> for PipelineSettings {
    fn from(config: &PulseConfig) -> Self {
        Self {
            builder: BuilderSettings {
                interval: config.snapshot_interval(),
                max_consecutive_errors: config.max_consecutive_errors,
            },
            renderer: RendererSettings {
                interval: config.render_interval(),
                history_capacity: config.chart_history_size,
                stall_ticks: config.stall_ticks,
            },
            channel_capacity: config.channel_capacity,
        }
    }
}

impl PipelineSettings {
    /// Same settings with both tick intervals replaced.
    #[must_use]
    pub fn with_intervals(mut self, builder: Duration, renderer: Duration) -> Self {
        self.builder.interval = builder;
        self.renderer.interval = renderer;
        self
    }
}
