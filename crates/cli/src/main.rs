//! hma: CLI client for the host metrics agent
//!
//! Talks to the agent's HTTP control plane: flush metrics, trigger runs,
//! inspect collector inventory, and submit external metrics.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod client;
mod output;

use client::AgentClient;

#[derive(Parser)]
#[command(name = "hma", about = "Host metrics agent client", version)]
struct Cli {
    /// Agent control-plane base URL
    #[arg(long, env = "HMA_URL", default_value = "http://127.0.0.1:2609")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the last collected metrics, optionally for one collector
    Metrics {
        /// Collector id (all collectors when omitted)
        id: Option<String>,
    },
    /// Trigger a collection run and show the refreshed metrics
    Run {
        /// Collector id (all collectors when omitted)
        id: Option<String>,
    },
    /// Show collector inventory records
    Inventory,
    /// Submit external metrics from a JSON file (or stdin with "-")
    Write {
        /// Group id to store the metrics under
        group: String,
        /// Path to a JSON file of {"name": {"_type": ..., "_value": ...}}
        file: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = AgentClient::new(&cli.url)?;

    match cli.command {
        Commands::Metrics { id } => {
            let metrics = client.metrics(id.as_deref()).await?;
            println!("{}", output::render_metrics(&metrics));
        }
        Commands::Run { id } => {
            let metrics = client.run(id.as_deref()).await?;
            println!("{}", output::render_metrics(&metrics));
        }
        Commands::Inventory => {
            let inventory = client.inventory().await?;
            println!("{}", output::render_inventory(&inventory));
        }
        Commands::Write { group, file } => {
            let raw = if file == "-" {
                std::io::read_to_string(std::io::stdin()).context("failed to read stdin")?
            } else {
                std::fs::read_to_string(&file)
                    .with_context(|| format!("failed to read {}", file))?
            };
            let payload: serde_json::Value =
                serde_json::from_str(&raw).context("payload is not valid JSON")?;

            client.write(&group, payload).await?;
            println!("stored metrics under group {:?}", group);
        }
    }

    Ok(())
}
