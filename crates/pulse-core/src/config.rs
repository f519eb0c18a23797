//! Configuration management for pulse.
//!
//! Loads configuration from `${PULSE_HOME}/config.toml` with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    /// Delay between snapshot builds, in milliseconds
    pub snapshot_interval_ms: u64,

    /// Delay between dashboard redraws, in milliseconds
    pub render_interval_ms: u64,

    /// Snapshots buffered between builder and renderer
    pub channel_capacity: usize,

    /// Lookback window for the activation rate, in seconds
    pub activation_window_secs: f64,

    /// Loss samples retained by the tracker
    pub loss_history_size: usize,

    /// Points kept for each dashboard chart
    pub chart_history_size: usize,

    /// Consecutive build failures before the builder slows down
    pub max_consecutive_errors: u32,

    /// Empty renderer ticks tolerated before a stall placeholder is shown
    pub stall_ticks: u32,

    /// Log lines kept for the dashboard log panel
    pub log_tail_size: usize,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            snapshot_interval_ms: Self::DEFAULT_SNAPSHOT_INTERVAL_MS,
            render_interval_ms: Self::DEFAULT_RENDER_INTERVAL_MS,
            channel_capacity: Self::DEFAULT_CHANNEL_CAPACITY,
            activation_window_secs: Self::DEFAULT_ACTIVATION_WINDOW_SECS,
            loss_history_size: Self::DEFAULT_LOSS_HISTORY_SIZE,
            chart_history_size: Self::DEFAULT_CHART_HISTORY_SIZE,
            max_consecutive_errors: Self::DEFAULT_MAX_CONSECUTIVE_ERRORS,
            stall_ticks: Self::DEFAULT_STALL_TICKS,
            log_tail_size: Self::DEFAULT_LOG_TAIL_SIZE,
        }
    }
}

impl PulseConfig {
    const DEFAULT_SNAPSHOT_INTERVAL_MS: u64 = 1000;
    const DEFAULT_RENDER_INTERVAL_MS: u64 = 500;
    const DEFAULT_CHANNEL_CAPACITY: usize = 5;
    const DEFAULT_ACTIVATION_WINDOW_SECS: f64 = 300.0;
    const DEFAULT_LOSS_HISTORY_SIZE: usize = 50;
    const DEFAULT_CHART_HISTORY_SIZE: usize = 50;
    const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 5;
    const DEFAULT_STALL_TICKS: u32 = 10;
    const DEFAULT_LOG_TAIL_SIZE: usize = 200;

    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read, parsed or validated.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read, parsed or validated.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))?
        } else {
            PulseConfig::default()
        };
        config
            .validate()
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        Ok(config)
    }

    /// Writes the default template to `path`, creating parent directories.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            bail!("Config file already exists at {}", path.display());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config dir {}", parent.display()))?;
        }
        fs::write(path, default_config_template())
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        Ok(())
    }

    /// Rejects zero intervals and capacities.
    ///
    /// # Errors
    /// Names the first offending field.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("snapshot_interval_ms", self.snapshot_interval_ms > 0),
            ("render_interval_ms", self.render_interval_ms > 0),
            ("channel_capacity", self.channel_capacity > 0),
            (
                "activation_window_secs",
                self.activation_window_secs.is_finite() && self.activation_window_secs > 0.0,
            ),
            ("loss_history_size", self.loss_history_size > 0),
            ("chart_history_size", self.chart_history_size > 0),
            ("max_consecutive_errors", self.max_consecutive_errors > 0),
            ("log_tail_size", self.log_tail_size > 0),
        ];
        if let Some((field, _)) = checks.iter().find(|(_, ok)| !ok) {
            bail!("{field} must be greater than zero");
        }
        Ok(())
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms)
    }

    pub fn render_interval(&self) -> Duration {
        Duration::from_millis(self.render_interval_ms)
    }
}

fn default_config_template() -> &'static str {
    r#"# pulse configuration

# Delay between snapshot builds, in milliseconds
snapshot_interval_ms = 1000

# Delay between dashboard redraws, in milliseconds
render_interval_ms = 500

# Snapshots buffered between builder and renderer (oldest dropped when full)
channel_capacity = 5

# Lookback window for the activation rate, in seconds
activation_window_secs = 300.0

# Loss samples retained by the tracker
loss_history_size = 50

# Points kept for each dashboard chart
chart_history_size = 50

# Consecutive build failures before the builder slows down
max_consecutive_errors = 5

# Empty renderer ticks tolerated before a stall placeholder is shown
stall_ticks = 10

# Log lines kept for the dashboard log panel
log_tail_size = 200
"#
}

pub mod paths {
    use std::path::PathBuf;

    /// Base directory: `$PULSE_HOME`, else `~/.config/pulse`, else `./.pulse`.
    pub fn pulse_home() -> PathBuf {
        if let Ok(home) = std::env::var("PULSE_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".pulse"),
            |h| h.join(".config").join("pulse"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        pulse_home().join("config.toml")
    }

    /// Returns the directory for rolling log files.
    pub fn logs_dir() -> PathBuf {
        pulse_home().join("logs")
    }
}
