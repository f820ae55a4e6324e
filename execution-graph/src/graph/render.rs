// Graph Rendering
// Text tree and JSON export adapters for visualization clients

use super::adjacency::AdjacencyList;
use super::traversal::StepBudget;
use crate::error::{GraphError, GraphResult};
use crate::models::{ExecutionMode, ExecutionStatus};

use serde::Serialize;
use std::collections::HashSet;

/// Render the graph below `start` as indented lines
///
/// Scope children sit one level deeper than their owner. Successors stay at
/// their predecessor's depth and are prefixed with `-> `, so a chain lane
/// reads as one continuous column.
pub fn render_tree(graph: &AdjacencyList, start: &str) -> GraphResult<Vec<String>> {
    if !graph.contains(start) {
        return Err(GraphError::not_found(start));
    }

    let mut budget = StepBudget::for_graph(graph);
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
    let mut lines = Vec::new();

    while let Some((id, depth)) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        let (Some(vertex), Some(list)) = (graph.vertex(id), graph.edge_list(id)) else {
            continue;
        };
        budget.step(id)?;

        let prefix = if id != start && list.prev_id().is_some() {
            "-> "
        } else {
            ""
        };
        let lane = if list.scope().chain_head().is_some() {
            " (chain)"
        } else {
            ""
        };
        lines.push(format!(
            "{}{}{} [{}]{}",
            "  ".repeat(depth),
            prefix,
            vertex.name,
            vertex.status,
            lane
        ));

        for next in list.next_ids() {
            stack.push((next, depth));
        }
        for child in list.edges().iter().rev() {
            stack.push((child, depth + 1));
        }
    }

    Ok(lines)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Child,
    Next,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportNode {
    pub id: String,
    pub label: String,
    pub status: ExecutionStatus,
    pub mode: ExecutionMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportEdge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
}

/// Nodes and edges for a web visualizer, sorted by id
#[derive(Debug, Clone, Serialize)]
pub struct GraphExport {
    pub nodes: Vec<ExportNode>,
    pub edges: Vec<ExportEdge>,
}

pub fn export(graph: &AdjacencyList) -> GraphExport {
    let mut nodes = Vec::with_capacity(graph.len());
    let mut edges = Vec::new();

    for id in graph.ids() {
        let (Some(vertex), Some(list)) = (graph.vertex(id), graph.edge_list(id)) else {
            continue;
        };

        nodes.push(ExportNode {
            id: vertex.id.clone(),
            label: vertex.name.clone(),
            status: vertex.status,
            mode: vertex.mode,
            parent_id: list.parent_id().map(str::to_string),
            step_type: vertex.step_type.clone(),
        });

        let children = list.edges().iter().map(|target| (target, EdgeKind::Child));
        let successors = list.next_ids().iter().map(|target| (target, EdgeKind::Next));
        for (target, kind) in children.chain(successors) {
            // Placeholders are not exported
            if graph.contains(target) {
                edges.push(ExportEdge {
                    source: id.to_string(),
                    target: target.clone(),
                    kind,
                });
            }
        }
    }

    GraphExport { nodes, edges }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::builder::generate;
    use crate::models::NodeExecutionRecord;

    fn graph() -> AdjacencyList {
        let records = vec![
            NodeExecutionRecord::new("plan", "pipeline", 0).with_name("Pipeline"),
            NodeExecutionRecord::new("plan", "build", 1)
                .with_parent("pipeline")
                .with_name("Build")
                .with_status(ExecutionStatus::Succeeded),
            NodeExecutionRecord::new("plan", "loop", 2)
                .with_parent("pipeline")
                .with_name("Loop"),
            NodeExecutionRecord::new("plan", "i0", 3)
                .with_parent("loop")
                .with_mode(ExecutionMode::Chain)
                .with_name("Iteration 0"),
            NodeExecutionRecord::new("plan", "i1", 4)
                .with_parent("loop")
                .with_mode(ExecutionMode::Chain)
                .with_name("Iteration 1"),
        ];
        generate("pipeline", &records).unwrap()
    }

    #[test]
    fn test_render_tree() {
        let lines = render_tree(&graph(), "pipeline").unwrap();
        assert_eq!(
            lines,
            vec![
                "Pipeline [queued]",
                "  Build [succeeded]",
                "  Loop [queued] (chain)",
                "    Iteration 0 [queued]",
                "    -> Iteration 1 [queued]",
            ]
        );
    }

    #[test]
    fn test_export_edges() {
        let export = export(&graph());

        assert_eq!(export.nodes.len(), 5);
        assert_eq!(export.nodes[0].id, "build");

        let next: Vec<_> = export
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Next)
            .map(|e| (e.source.as_str(), e.target.as_str()))
            .collect();
        assert_eq!(next, vec![("i0", "i1")]);

        let json = serde_json::to_value(&export).unwrap();
        // i0 sorts before loop and pipeline, so its next link comes first
        assert_eq!(json["edges"][0]["kind"], "next");
        assert_eq!(json["edges"][1]["kind"], "child");
        assert_eq!(json["nodes"][1]["mode"], "CHAIN");
    }
}
