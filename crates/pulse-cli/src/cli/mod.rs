//! CLI entry and dispatch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pulse_core::config::{PulseConfig, paths};

mod commands;

#[derive(Parser)]
#[command(name = "pulse")]
#[command(version)]
#[command(about = "Live telemetry dashboard for training workers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file to use instead of $PULSE_HOME/config.toml
    #[arg(long, global = true, env = "PULSE_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run the dashboard against a simulated worker
    Demo {
        /// Stop after this many seconds instead of waiting for Ctrl+C
        #[arg(long, value_name = "SECS")]
        duration: Option<u64>,

        /// Delay between simulated worker steps, in milliseconds
        #[arg(long, default_value_t = 100, value_name = "MS")]
        step_ms: u64,
    },

    /// Print an ASCII line chart of the given values
    Chart(commands::chart::ChartArgs),

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Print the effective configuration
    Show,
    /// Initialize a default config file (if not present)
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(paths::config_path);

    match cli.command {
        Commands::Demo { duration, step_ms } => {
            let config = PulseConfig::load_from(&config_path).context("load config")?;
            let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
            rt.block_on(commands::demo::run(&config, duration, step_ms))
        }
        Commands::Chart(args) => commands::chart::run(&args),
        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path(&config_path);
                Ok(())
            }
            ConfigCommands::Show => commands::config::show(&config_path),
            ConfigCommands::Init => commands::config::init(&config_path),
        },
    }
}
