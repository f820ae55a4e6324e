use super::load_service;
use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use execution_graph::{EngineConfig, TraversalOrder};

/// Print vertex ids in traversal order, one per line
#[derive(Args, Debug)]
pub struct TraverseArgs {
    /// JSON record document
    pub file: PathBuf,

    #[arg(long, value_name = "ID")]
    pub start: String,

    #[arg(long, value_name = "ID")]
    pub plan: Option<String>,

    /// bfs (breadth-first) or dfs (depth-first)
    #[arg(long, default_value_t = TraversalOrder::Bfs)]
    pub order: TraversalOrder,
}

pub async fn execute(args: TraverseArgs, config: EngineConfig) -> Result<()> {
    let (service, plan) = load_service(&args.file, args.plan.as_deref(), config).await?;

    service.generate(&plan, &args.start).await?;
    output::status("Traversing", &format!("{} from '{}'", args.order, args.start));

    let visited = service.traverse(&plan, &args.start, args.order).await?;
    for id in &visited {
        output::graph_line(id);
    }
    output::check(&format!("{} vertices visited", visited.len()));

    Ok(())
}
