//! Polyplay CLI - headless stream probing and QC tool
//!
//! Features:
//! - Source resolution (kind detection, inline clearkey extraction)
//! - Full probe sessions against a simulated playback surface
//! - Manifest reachability validation

use clap::{Parser, Subcommand};

mod commands;

/// Polyplay CLI - streaming playback toolkit
#[derive(Parser)]
#[command(name = "polyplay")]
#[command(version)]
#[command(about = "Probe and validate HLS/DASH/progressive stream sources", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a source string without touching the network
    Resolve {
        /// Source URL, possibly with an inline DRM block
        url: String,
    },

    /// Run a full playback session against a simulated surface
    Probe {
        /// Source URL, possibly with an inline DRM block
        url: String,

        /// Seconds to wait for the session to settle
        #[arg(short, long, default_value = "30")]
        timeout: u64,
    },

    /// Check that a source's manifest is reachable and parseable
    Validate {
        /// Source URL, possibly with an inline DRM block
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let json = cli.format == "json";
    match cli.command {
        Commands::Resolve { url } => commands::resolve(&url, json),
        Commands::Probe { url, timeout } => commands::probe(&url, timeout, json).await,
        Commands::Validate { url } => commands::validate(&url, json).await,
    }
}
