//! CLI command handlers.

pub mod chart;
pub mod config;
pub mod demo;
