//! Command-line flags (spec §6 Configuration). Everything here overrides
//! the durable config file for a single run; nothing here is itself
//! persisted.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "stationd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Cloud research-workstation control-plane daemon")]
pub struct Cli {
    /// Override the port the HTTP API listens on.
    #[arg(long)]
    pub port: Option<u16>,

    /// Override `STATIOND_CONFIG_DIR` for this run.
    #[arg(long)]
    pub config_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "pretty")]
    pub log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}
