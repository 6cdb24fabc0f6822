//! `cascview` binary entry point
//!
//! Thin wrapper around cascview-storage that:
//! 1. Parses command-line arguments
//! 2. Initializes logging
//! 3. Opens the storage
//! 4. Runs the requested command

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, LogFormat};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }

    commands::run(&cli)
}
