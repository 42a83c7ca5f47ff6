//! Flowcheck CLI - Main Entry Point
//!
//! Runs browser flow checks against a live application and lists the
//! scenarios it knows about.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use flowcheck_e2e::HarnessConfig;
use tokio_util::sync::CancellationToken;
use tracing::warn;

mod commands;
mod output;

use commands::{list, run};

/// Flowcheck - Browser Flow Verification
#[derive(Parser)]
#[command(name = "flowcheck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(
        short,
        long,
        default_value = "flowcheck.toml",
        env = "FLOWCHECK_CONFIG",
        global = true
    )]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scenarios against the target application
    Run(run::RunArgs),

    /// List known scenarios
    List(list::ListArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = HarnessConfig::load(&cli.config)?;

    match cli.command {
        Commands::Run(args) => {
            let cancel = CancellationToken::new();
            let interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, stopping after cleanup");
                    interrupt.cancel();
                }
            });

            let passed = run::execute(args, config, cli.format, cancel).await?;
            if !passed {
                std::process::exit(1);
            }
        }
        Commands::List(args) => list::execute(args, config, cli.format)?,
    }

    Ok(())
}
