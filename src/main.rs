//! tabletop - headless driver for the `Wait` deferred-task scheduler
//!
//! Replays a JSON command script against a fixed-step clock and reports
//! what fired, timed out, or was stopped.

mod command_script;
mod config;
mod headless;

use anyhow::{Context, Result};
use clap::Parser;
use config::{DriverConfig, DEFAULT_CONFIG_PATH};
use headless::HeadlessConfig;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless driver for the Wait scheduler", long_about = None)]
struct Args {
    /// Command script (JSON list of `{tick, command}` steps)
    #[arg(short, long)]
    script: PathBuf,

    /// Driver configuration (TOML); defaults to config/tabletop.toml when present
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the simulation rate
    #[arg(long)]
    tps: Option<u32>,

    /// Override the tick limit
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Write scheduler events as JSONL to this path
    #[arg(long)]
    event_log: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Initialize tracing with WARN level by default (can be overridden via RUST_LOG env var)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting tabletop v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut driver = DriverConfig::load_from_path(&config_path);
    if let Some(tps) = args.tps {
        if tps == 0 {
            anyhow::bail!("--tps must be at least 1");
        }
        driver.ticks_per_second = tps;
    }
    if let Some(max_ticks) = args.max_ticks {
        driver.max_ticks = max_ticks;
    }
    if let Some(event_log) = args.event_log {
        driver.event_log = Some(event_log);
    }

    let summary = headless::run(HeadlessConfig {
        script: args.script,
        driver,
    })?;
    let json = serde_json::to_string(&summary).context("failed to encode run summary")?;
    println!("{json}");
    Ok(())
}
