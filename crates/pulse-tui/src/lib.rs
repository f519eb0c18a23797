//! Terminal dashboard for the pulse telemetry pipeline.

pub mod render;
pub mod surface;
pub mod terminal;

pub use surface::TerminalSurface;
