mod commands;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::Result;

use commands::{extract, generate, replay, traverse};
use execution_graph::EngineConfig;

/// Inspect materialized pipeline execution graphs
#[derive(Parser, Debug)]
#[command(name = "execgraph", version, about)]
struct Cli {
    /// Engine configuration file (YAML)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the full graph from a record document
    Generate(generate::GenerateArgs),
    /// Build the graph, then cut out the part below one vertex
    Extract(extract::ExtractArgs),
    /// List vertex ids in breadth-first or depth-first order
    Traverse(traverse::TraverseArgs),
    /// Feed records one at a time through the incremental updater
    Replay(replay::ReplayArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Command::Generate(args) => generate::execute(args, config).await,
        Command::Extract(args) => extract::execute(args, config).await,
        Command::Traverse(args) => traverse::execute(args, config).await,
        Command::Replay(args) => replay::execute(args, config).await,
    }
}
