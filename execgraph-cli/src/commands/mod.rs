// CLI Commands
// Shared loading and printing for the execgraph subcommands

pub mod extract;
pub mod generate;
pub mod replay;
pub mod traverse;

use crate::output;

use std::path::Path;

use clap::ValueEnum;
use color_eyre::Result;
use tracing::debug;

use execution_graph::{
    export, render_tree, AdjacencyList, EngineConfig, GraphService, InMemoryStore,
};

/// How a materialized graph is printed
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Indented text tree
    #[default]
    Tree,
    /// Nodes and edges as JSON
    Json,
}

/// Load a record document and pick the plan execution to work on
///
/// `plan` may be omitted when the document holds a single execution.
pub async fn load_service(
    file: &Path,
    plan: Option<&str>,
    config: EngineConfig,
) -> Result<(GraphService<InMemoryStore>, String)> {
    if !file.exists() {
        color_eyre::eyre::bail!("Record document not found: {}", file.display());
    }

    output::status("Loading", &format!("{}", file.display()));
    let store = InMemoryStore::from_json_file(file)?;
    let executions = store.plan_execution_ids().await;
    debug!(executions = executions.len(), "loaded record document");

    let plan_execution_id = match plan {
        Some(plan) if executions.iter().any(|id| id == plan) => plan.to_string(),
        Some(plan) => color_eyre::eyre::bail!("No records for plan execution '{}'", plan),
        None => match executions.as_slice() {
            [only] => only.clone(),
            [] => color_eyre::eyre::bail!("Record document is empty"),
            _ => color_eyre::eyre::bail!(
                "Document holds {} plan executions, choose one with --plan ({})",
                executions.len(),
                executions.join(", ")
            ),
        },
    };

    Ok((GraphService::new(store, config), plan_execution_id))
}

pub fn print_graph(graph: &AdjacencyList, start: &str, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Tree => {
            for line in render_tree(graph, start)? {
                output::graph_line(&line);
            }
        }
        OutputFormat::Json => {
            output::graph_line(&serde_json::to_string_pretty(&export(graph))?);
        }
    }
    Ok(())
}

/// Summarize a graph on stderr
pub fn summarize(graph: &AdjacencyList) {
    let placeholders: Vec<&str> = graph.placeholders().collect();
    output::check(&format!(
        "{} vertices, {} roots",
        graph.len(),
        graph.roots().len()
    ));
    if !placeholders.is_empty() {
        output::warning(&format!(
            "{} placeholder(s) still waiting: {}",
            placeholders.len(),
            placeholders.join(", ")
        ));
    }
}
