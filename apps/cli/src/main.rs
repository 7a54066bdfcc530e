use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use nrfdfu_core::session::{DfuSession, SessionConfig};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "nRF52 serial DFU tool", long_about = None)]
struct Args {
    /// Session configuration (TOML)
    #[arg(short, long, default_value = "nrfdfu.toml")]
    config: PathBuf,

    /// Serial port, overrides the config file
    #[arg(short, long)]
    port: Option<String>,

    /// Directory image paths are relative to, overrides the config file
    #[arg(long)]
    asset_root: Option<PathBuf>,

    /// Write a default configuration to --config and exit
    #[arg(long)]
    write_default_config: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn run(args: Args) -> Result<()> {
    if args.write_default_config {
        SessionConfig::default().save_to_file(&args.config)?;
        info!(path = %args.config.display(), "Wrote default configuration");
        return Ok(());
    }

    let mut config = SessionConfig::load_from_file(&args.config)?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(root) = args.asset_root {
        config.asset_root = root;
    }

    DfuSession::new(config).run()
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting nrfdfu...");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}
