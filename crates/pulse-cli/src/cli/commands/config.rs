//! Config command handlers.

use std::path::Path;

use anyhow::{Context, Result};
use pulse_core::config::PulseConfig;

pub fn path(config_path: &Path) {
    println!("{}", config_path.display());
}

pub fn show(config_path: &Path) -> Result<()> {
    let config = PulseConfig::load_from(config_path)?;
    let toml = toml::to_string_pretty(&config).context("serialize config")?;
    print!("{toml}");
    Ok(())
}

pub fn init(config_path: &Path) -> Result<()> {
    PulseConfig::init(config_path)
        .with_context(|| format!("init config at {}", config_path.display()))?;
    println!("Created config at {}", config_path.display());
    Ok(())
}
