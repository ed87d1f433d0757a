//! Switchboard CLI
//!
//! Runs a small demonstration of the message fabric and inspects the
//! fabric configuration.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use switchboard_core::config::{BusConfig, Directories};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod demo;

/// Switchboard - message fabric for controllable components
#[derive(Parser)]
#[command(name = "switchboard")]
#[command(version, about, long_about = None)]
#[command(after_help = "\
Examples:
  switchboard demo                     Mixer demo with 3 clients
  switchboard demo --clients 5         Mixer demo with 5 clients
  switchboard config                   Print the effective configuration
  switchboard config --write-default   Write the default configuration file
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a mixer controllable on a driver thread and drive it from clients
    Demo {
        /// Number of connected clients
        #[arg(long, default_value_t = 3)]
        clients: usize,

        /// Function call timeout (defaults to `function.timeoutMs` from the config)
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,

        /// Config file (defaults to ~/.config/switchboard/config.json)
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Save the final state snapshot to this file
        #[arg(long, value_name = "PATH")]
        save_state: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config {
        /// Config file (defaults to ~/.config/switchboard/config.json)
        #[arg(long, value_name = "PATH")]
        path: Option<PathBuf>,

        /// Write the default configuration to the file
        #[arg(long)]
        write_default: bool,
    },
}

/// Set up logging with file output for debugging.
/// In debug builds, defaults to debug level and also logs to a timestamped file.
/// In release builds, defaults to info level and logs to stderr.
fn setup_logging() {
    let default_level = if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "switchboard={default_level},switchboard_core={default_level}"
        ))
    });

    if cfg!(debug_assertions) {
        let temp_dir = std::env::temp_dir();
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let log_filename = format!("switchboard-{timestamp}.log");
        let log_path = temp_dir.join(&log_filename);

        let file_appender = tracing_appender::rolling::never(&temp_dir, &log_filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        std::mem::forget(guard);

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_line_number(true);

        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true);

        tracing_subscriber::registry()
            .with(file_layer)
            .with(stderr_layer)
            .with(filter)
            .init();

        eprintln!("Logging to: {} (and stderr)", log_path.display());
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}

fn config_path(path: Option<PathBuf>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(path),
        None => Ok(Directories::new()
            .context("Failed to resolve the switchboard directories")?
            .config_file),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<BusConfig> {
    let path = config_path(path)?;
    BusConfig::load(&path).with_context(|| format!("Failed to load {}", path.display()))
}

fn run_config(path: Option<PathBuf>, write_default: bool) -> Result<()> {
    let path = config_path(path)?;

    if write_default {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        BusConfig::default()
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote default configuration to {}", path.display());
    }

    let config =
        BusConfig::load(&path).with_context(|| format!("Failed to load {}", path.display()))?;
    println!("# {}", path.display());
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging();

    match cli.command {
        Commands::Demo {
            clients,
            timeout_ms,
            config,
            save_state,
        } => {
            let config = load_config(config)?;
            let timeout = timeout_ms.map_or_else(|| config.function.timeout(), Duration::from_millis);
            demo::run(&config, clients, timeout, save_state.as_deref())
        }
        Commands::Config {
            path,
            write_default,
        } => run_config(path, write_default),
    }
}
