//! datablock command-line tool.
//!
//! Usage:
//!   datablock inspect shot.datablock
//!   datablock duplicate-scene shot.datablock Scene --mode full-copy -o out.datablock

use anyhow::Result;
use clap::Parser;
use datablock_cli::{Args, run};
use datablock_storage::StoreConfig;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = match &args.config {
        Some(path) => StoreConfig::load_or_default(path),
        None => StoreConfig::default(),
    };
    let report = run(&args.command, &config)?;
    println!("{report}");
    Ok(())
}
