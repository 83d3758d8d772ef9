//! Workload Optimizer CLI
//!
//! A command-line tool for inspecting the optimizer service: execution
//! metrics per strategy, safety check outcomes, and service health.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{metrics, status};

/// Workload Optimizer CLI
#[derive(Parser)]
#[command(name = "wopt")]
#[command(author, version, about = "CLI for the Workload Optimizer", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via WOPT_API_URL env var)
    #[arg(long, env = "WOPT_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// View aggregate execution metrics
    #[command(subcommand)]
    Metrics(MetricsCommands),

    /// Show optimizer service health
    Status,
}

#[derive(Subcommand)]
pub enum MetricsCommands {
    /// Engine-level plan and action counters
    Optimization,

    /// Per-executor counters for all three strategies
    Executors,

    /// Safety check and rollback counters
    Safety,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize client
    let client = client::ApiClient::new(&cli.api_url)?;

    // Execute command
    match cli.command {
        Commands::Metrics(metrics_cmd) => match metrics_cmd {
            MetricsCommands::Optimization => {
                metrics::show_optimization(&client, cli.format).await?;
            }
            MetricsCommands::Executors => {
                metrics::show_executors(&client, cli.format).await?;
            }
            MetricsCommands::Safety => {
                metrics::show_safety(&client, cli.format).await?;
            }
        },
        Commands::Status => {
            status::show_status(&client, cli.format).await?;
        }
    }

    Ok(())
}
