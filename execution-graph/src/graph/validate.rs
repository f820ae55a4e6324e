// Graph Validation
// Structural checks for the adjacency invariants

use super::adjacency::AdjacencyList;
use super::traversal::StepBudget;
use crate::error::{GraphError, GraphResult};

use std::collections::HashMap;

/// Check every structural invariant, reporting the first violation found
pub fn check_invariants(graph: &AdjacencyList) -> GraphResult<()> {
    check_references(graph)?;
    check_parent_links(graph)?;
    check_sequential_links(graph)?;
    check_chain_lanes(graph)?;
    detect_cycles(graph)
}

/// Referenced ids are materialized or known placeholders
fn check_references(graph: &AdjacencyList) -> GraphResult<()> {
    for (id, list) in graph.edge_lists() {
        let referenced = list
            .edges()
            .iter()
            .chain(list.next_ids())
            .chain(list.prev_ids());
        for target in referenced {
            if !graph.contains(target) && !graph.is_placeholder(target) {
                return Err(GraphError::invariant(
                    id,
                    format!("references unknown vertex '{}'", target),
                ));
            }
        }
    }
    Ok(())
}

fn check_parent_links(graph: &AdjacencyList) -> GraphResult<()> {
    for (id, list) in graph.edge_lists() {
        for child in list.edges() {
            if let Some(child_list) = graph.edge_list(child) {
                if child_list.parent_id() != Some(id.as_str()) {
                    return Err(GraphError::invariant(
                        child,
                        format!(
                            "listed as child of '{}' but its parent is {:?}",
                            id,
                            child_list.parent_id()
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn check_sequential_links(graph: &AdjacencyList) -> GraphResult<()> {
    for (id, list) in graph.edge_lists() {
        if list.next_ids().len() > 1 || list.prev_ids().len() > 1 {
            return Err(GraphError::invariant(id, "more than one next or previous id"));
        }
        for next in list.next_ids() {
            if next == id {
                return Err(GraphError::invariant(id, "next id points at itself"));
            }
            if let Some(next_list) = graph.edge_list(next) {
                if next_list.prev_id() != Some(id.as_str()) {
                    return Err(GraphError::invariant(
                        next,
                        format!("successor of '{}' does not point back to it", id),
                    ));
                }
            }
        }
    }
    Ok(())
}

/// A chain scope lists its head once; continuations stay out of `edges`
fn check_chain_lanes(graph: &AdjacencyList) -> GraphResult<()> {
    for (id, list) in graph.edge_lists() {
        let Some(head) = list.scope().chain_head() else {
            continue;
        };
        if !list.edges().iter().any(|child| child == head) {
            return Err(GraphError::invariant(
                id,
                format!("chain head '{}' missing from edges", head),
            ));
        }

        let mut budget = StepBudget::for_graph(graph);
        let mut current = graph.lane_successor(id, head);
        while let Some(member) = current {
            budget.step(member)?;
            if list.edges().iter().any(|child| child == member) {
                return Err(GraphError::invariant(
                    id,
                    format!("chain continuation '{}' duplicated into edges", member),
                ));
            }
            current = graph.lane_successor(id, member);
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Iterative three-color DFS over `edges` and `next_ids`
fn detect_cycles(graph: &AdjacencyList) -> GraphResult<()> {
    let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(graph.len());

    for root in graph.ids() {
        if marks.contains_key(root) {
            continue;
        }

        // (vertex, index of the next outgoing link to explore)
        let mut stack: Vec<(&str, usize)> = vec![(root, 0)];
        marks.insert(root, Mark::InProgress);

        while let Some((id, cursor)) = stack.pop() {
            let Some(list) = graph.edge_list(id) else {
                marks.insert(id, Mark::Done);
                continue;
            };
            let outgoing = list.edges().iter().chain(list.next_ids()).nth(cursor);

            match outgoing {
                Some(target) => {
                    stack.push((id, cursor + 1));
                    match marks.get(target.as_str()) {
                        Some(Mark::InProgress) => {
                            return Err(GraphError::corruption(target.as_str(), graph.len()));
                        }
                        Some(Mark::Done) => {}
                        None if graph.contains(target) => {
                            marks.insert(target.as_str(), Mark::InProgress);
                            stack.push((target.as_str(), 0));
                        }
                        None => {}
                    }
                }
                None => {
                    marks.insert(id, Mark::Done);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::builder::generate;
    use crate::graph::incremental::{add_vertex, tests::force_next};
    use crate::models::{ExecutionMode, NodeExecutionRecord};

    #[test]
    fn test_generated_graph_is_valid() {
        let records = vec![
            NodeExecutionRecord::new("plan", "root", 0),
            NodeExecutionRecord::new("plan", "a", 1).with_parent("root"),
            NodeExecutionRecord::new("plan", "c0", 2)
                .with_parent("root")
                .with_mode(ExecutionMode::Chain),
            NodeExecutionRecord::new("plan", "c1", 3)
                .with_parent("root")
                .with_mode(ExecutionMode::Chain),
        ];
        let graph = generate("root", &records).unwrap();
        assert!(check_invariants(&graph).is_ok());
    }

    #[test]
    fn test_dangling_previous_is_allowed_as_placeholder() {
        let mut graph = AdjacencyList::new();
        add_vertex(
            &mut graph,
            &NodeExecutionRecord::new("plan", "late", 5).with_previous("early"),
        )
        .unwrap();

        assert!(graph.is_placeholder("early"));
        assert!(check_invariants(&graph).is_ok());
    }

    #[test]
    fn test_cycle_is_reported_as_corruption() {
        let mut graph = AdjacencyList::new();
        add_vertex(&mut graph, &NodeExecutionRecord::new("plan", "a", 1)).unwrap();
        add_vertex(
            &mut graph,
            &NodeExecutionRecord::new("plan", "b", 2).with_previous("a"),
        )
        .unwrap();
        force_next(&mut graph, "b", "a");

        let err = check_invariants(&graph).unwrap_err();
        assert!(err.is_invariant_violation());
    }
}
