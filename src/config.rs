//! Command line and logging setup.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Project EC2 resources as a filesystem.
#[derive(Debug, Parser)]
#[command(name = "ec2fs", version, about)]
pub struct Cli {
    /// Directory to mount the namespace on.
    pub mountpoint: PathBuf,

    /// Enable debug logging.
    #[arg(short, long)]
    pub debug: bool,

    /// Serve from the in-process mock instead of a real endpoint.
    #[arg(long)]
    pub mock: bool,

    /// Detach from the terminal after mounting.
    #[arg(long)]
    pub background: bool,

    /// Region the remote endpoint lives in.
    #[arg(long, default_value = "us-east-2")]
    pub region_name: String,
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the debug flag when set. Repeated initialization is
/// tolerated so tests can call this freely.
pub fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .ok();
}
