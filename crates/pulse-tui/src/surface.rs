use std::io::Stdout;

use pulse_core::pipeline::{DashboardView, Surface};
use pulse_core::{Result, TelemetryError};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;

use crate::render::{ChartPanels, DashboardAreas, render_dashboard, render_error};
use crate::terminal::{restore_terminal, setup_terminal};

/// Full-screen dashboard on stdout. Restores the terminal when dropped.
pub struct TerminalSurface {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalSurface {
    /// Enters the alternate screen.
    ///
    /// # Errors
    /// Returns an error if the terminal cannot be prepared.
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            terminal: setup_terminal()?,
        })
    }
}

impl Surface for TerminalSurface {
    fn draw(&mut self, view: &DashboardView<'_>) -> Result<()> {
        let size = self.terminal.size().map_err(TelemetryError::render)?;
        let areas = DashboardAreas::new(Rect::new(0, 0, size.width, size.height));
        let charts = ChartPanels::prepare(view, &areas)?;
        self.terminal
            .draw(|frame| render_dashboard(frame, view, &charts))
            .map_err(TelemetryError::render)?;
        Ok(())
    }

    fn draw_error(&mut self, message: &str) -> Result<()> {
        self.terminal
            .draw(|frame| render_error(frame, message))
            .map_err(TelemetryError::render)?;
        Ok(())
    }
}

impl Drop for TerminalSurface {
    fn drop(&mut self) {
        if let Err(err) = restore_terminal() {
            tracing::warn!("failed to restore terminal: {err:#}");
        }
    }
}
