mod cli;
mod server;
mod tools;

use ada_recall::config;
use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ada-recall", version, about = "Hybrid memory retrieval MCP server for Ada")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server (stdio transport unless --http)
    Serve {
        /// Serve streamable HTTP on server.host:server.port instead of stdio
        #[arg(long)]
        http: bool,
    },
    /// Search stored memories
    Search {
        query: String,
        /// Maximum number of results
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Write sparse vectors for documents that lack one
    Backfill {
        /// Key patterns to scan (defaults to the search namespaces)
        patterns: Vec<String>,
    },
    /// Show per-namespace document counts and sparse coverage
    Stats,
    /// Check the store connection and print a config summary
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = config::AdaConfig::load()?;

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { http } => {
            if http || config.server.transport == "http" {
                server::serve_http(config).await?;
            } else {
                server::serve_stdio(config).await?;
            }
        }
        Command::Search { query, top_k } => {
            cli::search::search(&config, &query, top_k).await?;
        }
        Command::Backfill { patterns } => {
            cli::backfill::backfill(&config, patterns).await?;
        }
        Command::Stats => {
            cli::stats::stats(&config).await?;
        }
        Command::Doctor => {
            cli::doctor::doctor(&config).await?;
        }
    }

    Ok(())
}
