use super::{load_service, print_graph, summarize, OutputFormat};
use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use execution_graph::EngineConfig;

/// Build the full graph of one plan execution
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// JSON record document
    pub file: PathBuf,

    /// Vertex the graph is built from
    #[arg(long, value_name = "ID")]
    pub start: String,

    /// Plan execution to use when the document holds several
    #[arg(long, value_name = "ID")]
    pub plan: Option<String>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Tree)]
    pub format: OutputFormat,

    /// Resolve outcomes and step details for every vertex
    #[arg(long)]
    pub details: bool,
}

pub async fn execute(args: GenerateArgs, config: EngineConfig) -> Result<()> {
    let config = if args.details {
        config.with_details(true)
    } else {
        config
    };
    let (service, plan) = load_service(&args.file, args.plan.as_deref(), config).await?;

    output::status("Generating", &format!("{} from '{}'", plan, args.start));
    let graph = match service.generate(&plan, &args.start).await {
        Ok(graph) => graph,
        Err(e) => {
            output::error(&e.to_string());
            std::process::exit(1);
        }
    };

    summarize(&graph);
    if args.details {
        let resolved = graph.vertices().filter(|v| v.has_details()).count();
        output::dim(&format!("  details resolved for {} vertices", resolved));
    }
    print_graph(&graph, &args.start, args.format)
}
