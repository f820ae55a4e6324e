use super::{load_service, summarize};
use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;
use tokio_stream::StreamExt;

use execution_graph::{
    check_invariants, event_channel, event_stream, AdjacencyList, EngineConfig, ExecutionStore,
    GraphEvent,
};

/// Feed records one at a time through the incremental updater, in document order
#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// JSON record document
    pub file: PathBuf,

    #[arg(long, value_name = "ID")]
    pub plan: Option<String>,

    /// Stop at the first rejected record
    #[arg(long)]
    pub strict: bool,
}

pub async fn execute(args: ReplayArgs, config: EngineConfig) -> Result<()> {
    let (service, plan) = load_service(&args.file, args.plan.as_deref(), config).await?;
    let (tx, rx) = event_channel();
    let service = service.with_events(tx);

    let reporter = tokio::spawn(async move {
        let mut events = event_stream(rx);
        while let Some(event) = events.next().await {
            report(&event);
        }
    });

    let records = service.store().fetch_records(&plan).await?;
    output::status("Replaying", &format!("{} records of {}", records.len(), plan));

    let mut rejected = 0;
    for record in &records {
        if let Err(e) = service.add_vertex(record).await {
            rejected += 1;
            output::error(&format!("{}: {}", record.id, e));
            if args.strict {
                break;
            }
        }
    }

    let graph = service.graph(&plan).await?;
    // Closing the channel ends the reporter
    drop(service);
    reporter.await?;

    summarize(&graph);
    verify(&graph)?;

    if rejected > 0 {
        color_eyre::eyre::bail!("{} record(s) rejected", rejected);
    }
    output::success("Replay complete");
    Ok(())
}

/// Fail the command when the replayed graph breaks an invariant
fn verify(graph: &AdjacencyList) -> Result<()> {
    if let Err(e) = check_invariants(graph) {
        color_eyre::eyre::bail!("Invariant check failed: {}", e);
    }
    output::check("All invariants hold");
    Ok(())
}

fn report(event: &GraphEvent) {
    match event {
        GraphEvent::VertexAdded {
            vertex_id,
            placement,
            ..
        } => output::dim(&format!("  + {} {:?}", vertex_id, placement)),
        GraphEvent::VertexReconciled {
            vertex_id,
            resolved_by,
            ..
        } => output::check(&format!("{} linked once '{}' arrived", vertex_id, resolved_by)),
        GraphEvent::StatusRefreshed {
            vertex_id, status, ..
        } => output::dim(&format!("  ~ {} is now {}", vertex_id, status)),
        GraphEvent::VertexRemoved { vertex_id, .. } => {
            output::dim(&format!("  - {}", vertex_id))
        }
        GraphEvent::GraphGenerated { .. } | GraphEvent::GraphArchived { .. } => {}
    }
}
