//! Terminal lifecycle management.
//!
//! The dashboard only draws; it never reads keys. Raw mode stays off so
//! Ctrl+C still reaches the process as a signal. Terminal state is restored on:
//! - Normal exit (via Drop of the surface)
//! - Panic (via the panic hook), unless the pipeline catches it

use std::io::{self, Stdout};
use std::panic;

use anyhow::{Context, Result};
use crossterm::cursor::{Hide, Show};
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen};
use pulse_core::pipeline;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

/// Sets up the terminal for the dashboard.
///
/// - Enters alternate screen
/// - Hides the cursor
/// - Creates the terminal instance
///
/// Call `install_panic_hook()` before this to ensure terminal restore on panic.
///
/// # Errors
/// Returns an error if the terminal cannot be prepared.
pub fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, Hide).context("Failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend).context("Failed to create terminal")?;
    Ok(terminal)
}

/// Restores terminal state.
///
/// This function is idempotent and safe to call multiple times.
///
/// # Errors
/// Returns an error if the alternate screen cannot be left.
pub fn restore_terminal() -> Result<()> {
    execute!(io::stdout(), Show, LeaveAlternateScreen)
        .context("Failed to leave alternate screen")?;
    Ok(())
}

/// Installs a panic hook that restores the terminal before printing the panic.
///
/// Panics inside a pipeline stage are caught and shown on the dashboard, so
/// for those the hook only logs and the dashboard stays up.
///
/// Call this BEFORE `setup_terminal()` to ensure terminal restore on panic.
pub fn install_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        if pipeline::panic_is_contained() {
            tracing::error!("contained panic: {panic_info}");
            return;
        }
        let _ = restore_terminal();
        original_hook(panic_info);
    }));
}
