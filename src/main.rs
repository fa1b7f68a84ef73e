//! cpumon: live CPU utilization monitor with rolling per-core history.
//!
//! Run with:  `RUST_LOG=info cpumon --per-core`

use anyhow::{Context, Result};
use clap::Parser;
use cpumon_app::RunOptions;
use cpumon_config::{ConfigOverrides, SourcePreference};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Real-time CPU utilization monitor.
#[derive(Debug, Parser)]
#[command(
    version,
    about,
    after_help = "Examples:\n  \
                  cpumon --per-core                 # Show all CPU cores\n  \
                  cpumon --max-cores 4 --per-core   # Show first 4 cores\n  \
                  cpumon -i 250 -t 120              # Fast updates, long history"
)]
struct Cli {
    /// Update interval in milliseconds (100-10000)
    #[arg(short, long, value_name = "MS")]
    interval: Option<u64>,

    /// Time window for historical data in seconds (10-3600)
    #[arg(short = 't', long, value_name = "SECONDS")]
    time_window: Option<u64>,

    /// Chart width in pixels
    #[arg(short, long, value_name = "PIXELS")]
    width: Option<u32>,

    /// Chart height in pixels
    #[arg(long, value_name = "PIXELS")]
    height: Option<u32>,

    /// Start in per-core view (toggle at runtime with `v`)
    #[arg(long)]
    per_core: bool,

    /// Maximum number of cores to display (0 = all)
    #[arg(long, value_name = "N")]
    max_cores: Option<usize>,

    /// Counter source: auto, sysinfo or proc-stat
    #[arg(long, value_name = "SOURCE", value_parser = parse_source)]
    source: Option<SourcePreference>,

    /// Config file (default: $XDG_CONFIG_HOME/cpumon/cpumon.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Do not reload the config file when it changes
    #[arg(long)]
    no_watch: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            interval_ms: self.interval,
            window_s:    self.time_window,
            per_core:    self.per_core.then_some(true),
            max_cores:   self.max_cores,
            width:       self.width,
            height:      self.height,
            source:      self.source,
        }
    }
}

fn parse_source(s: &str) -> Result<SourcePreference, String> {
    s.parse::<SourcePreference>().map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    // Structured logging on stderr; stdout carries the rendered frames.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::info!("cpumon v{} starting", env!("CARGO_PKG_VERSION"));

    let path = cli.config.clone().unwrap_or_else(cpumon_config::default_path);
    let overrides = cli.overrides();

    let mut config = cpumon_config::load(&path)
        .with_context(|| format!("cannot load config from '{}'", path.display()))?;
    overrides.apply(&mut config);

    let options = RunOptions {
        watch_path: (!cli.no_watch).then_some(path),
        overrides,
    };
    cpumon_app::run(config, options)
}
