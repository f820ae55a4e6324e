use super::{load_service, print_graph, summarize, OutputFormat};
use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use execution_graph::EngineConfig;

/// Build the graph, then extract the subgraph below one vertex
#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// JSON record document
    pub file: PathBuf,

    /// Vertex the full graph is built from
    #[arg(long, value_name = "ID")]
    pub start: String,

    /// Vertex the extracted subgraph starts at
    #[arg(long, value_name = "ID")]
    pub from: String,

    #[arg(long, value_name = "ID")]
    pub plan: Option<String>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Tree)]
    pub format: OutputFormat,
}

pub async fn execute(args: ExtractArgs, config: EngineConfig) -> Result<()> {
    let (service, plan) = load_service(&args.file, args.plan.as_deref(), config).await?;

    output::status("Generating", &format!("{} from '{}'", plan, args.start));
    let full = service.generate(&plan, &args.start).await?;
    output::dim(&format!("  cached {} vertices", full.len()));

    output::status("Extracting", &format!("below '{}'", args.from));
    let subgraph = service.extract_subgraph(&plan, &args.from).await?;

    summarize(&subgraph);
    print_graph(&subgraph, &args.from, args.format)
}
