//! `provisio`: inspect the resilience configuration and rehearse a
//! transactional deployment against a simulated platform

mod cli;
mod commands;
mod output;
mod platform;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Config(cmd) => commands::config::run(cmd, cli.config.as_deref()).await,
        Commands::Simulate(args) => commands::simulate::run(args, cli.config.as_deref()).await,
    }
}

/// `PROVISIO_LOG` takes an `EnvFilter` directive and wins over the flags
fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_env("PROVISIO_LOG").unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output, including --json
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
