// Partial Extraction
// Cuts the downstream closure of one vertex out of a cached graph for paginated retrieval

use super::adjacency::{AdjacencyList, EdgeList};
use super::traversal::StepBudget;
use crate::error::{GraphError, GraphResult};

use std::collections::HashSet;

/// Return the minimal graph holding `starting_id` and everything reachable
/// from it through `edges` and `next_ids`.
///
/// The starting vertex comes back as a root: its parent and previous links
/// are dropped. Links leaving the closure are trimmed so the result is a
/// valid adjacency list on its own.
pub fn extract_subgraph(cached: &AdjacencyList, starting_id: &str) -> GraphResult<AdjacencyList> {
    if !cached.contains(starting_id) {
        return Err(GraphError::not_found(starting_id));
    }

    let closure = downstream_closure(cached, starting_id)?;
    let mut subgraph = AdjacencyList::new();

    for id in &closure {
        let (Some(vertex), Some(list)) = (cached.vertex(id), cached.edge_list(id)) else {
            continue;
        };

        let mut restricted = restrict(list, &closure);
        if *id == starting_id {
            restricted.parent_id = None;
            restricted.prev_ids.clear();
        }
        subgraph.insert(vertex.clone(), restricted);
    }

    Ok(subgraph)
}

fn downstream_closure<'a>(cached: &'a AdjacencyList, start: &'a str) -> GraphResult<HashSet<&'a str>> {
    let mut budget = StepBudget::for_graph(cached);
    let mut closure: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = vec![start];

    while let Some(id) = stack.pop() {
        if closure.contains(id) {
            continue;
        }
        // Stale cache entries end the branch
        let Some(list) = cached.edge_list(id) else {
            continue;
        };
        budget.step(id)?;
        closure.insert(id);

        for target in list.edges().iter().chain(list.next_ids()) {
            if !closure.contains(target.as_str()) {
                stack.push(target);
            }
        }
    }

    Ok(closure)
}

fn restrict(list: &EdgeList, closure: &HashSet<&str>) -> EdgeList {
    let keep = |ids: &[String]| -> Vec<String> {
        ids.iter()
            .filter(|id| closure.contains(id.as_str()))
            .cloned()
            .collect()
    };

    EdgeList {
        edges: keep(&list.edges),
        next_ids: keep(&list.next_ids),
        prev_ids: keep(&list.prev_ids),
        parent_id: list
            .parent_id
            .clone()
            .filter(|parent| closure.contains(parent.as_str())),
        scope: list.scope.clone(),
    }
}
