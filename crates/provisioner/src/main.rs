use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "provisioner")]
#[command(about = "Bare-metal provisioning - imaging, partitioning, LVM and network boot")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "provisioner.yaml")]
    config: PathBuf,

    /// Log filter directive, used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute an operation request and print the result as JSON
    Run {
        /// Request file (JSON or YAML), or `-` for stdin
        request: PathBuf,
    },

    /// Validate a request without locking or executing anything
    Validate {
        /// Request file (JSON or YAML), or `-` for stdin
        request: PathBuf,
    },

    /// Print the effective configuration
    ShowConfig,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the JSON result.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    smol::block_on(async {
        match cli.command {
            Commands::Run { request } => commands::run::run(&cli.config, &request).await,
            Commands::Validate { request } => commands::validate::run(&cli.config, &request).await,
            Commands::ShowConfig => commands::show_config::run(&cli.config).await,
        }
    })
}
