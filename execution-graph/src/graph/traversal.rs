// Graph Traversal
// Breadth-first and depth-first walkers over a completed adjacency list

use super::adjacency::AdjacencyList;
use crate::error::{GraphError, GraphResult};

use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;

/// Upper bound on traversal steps, sized to the graph it walks
///
/// A valid graph never needs more steps than it has vertices, so running
/// out means the links contain a cycle.
#[derive(Debug, Clone)]
pub struct StepBudget {
    limit: usize,
    used: usize,
}

impl StepBudget {
    pub fn new(limit: usize) -> Self {
        Self { limit, used: 0 }
    }

    pub fn for_graph(graph: &AdjacencyList) -> Self {
        Self::new(graph.len())
    }

    /// Consume one step while standing on `at`
    pub fn step(&mut self, at: &str) -> GraphResult<()> {
        self.used += 1;
        if self.used > self.limit {
            return Err(GraphError::corruption(at, self.limit));
        }
        Ok(())
    }

    pub fn used(&self) -> usize {
        self.used
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraversalOrder {
    #[default]
    Bfs,
    Dfs,
}

impl fmt::Display for TraversalOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraversalOrder::Bfs => write!(f, "bfs"),
            TraversalOrder::Dfs => write!(f, "dfs"),
        }
    }
}

impl FromStr for TraversalOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bfs" | "breadth-first" => Ok(TraversalOrder::Bfs),
            "dfs" | "depth-first" => Ok(TraversalOrder::Dfs),
            other => Err(format!("unknown traversal order '{}'", other)),
        }
    }
}

pub fn traverse(
    graph: &AdjacencyList,
    start: &str,
    order: TraversalOrder,
) -> GraphResult<Vec<String>> {
    match order {
        TraversalOrder::Bfs => traverse_bfs(graph, start),
        TraversalOrder::Dfs => traverse_dfs(graph, start),
    }
}

/// Level-order walk; a scope's children come before the scope's successor
pub fn traverse_bfs(graph: &AdjacencyList, start: &str) -> GraphResult<Vec<String>> {
    if !graph.contains(start) {
        return Err(GraphError::not_found(start));
    }

    let mut budget = StepBudget::for_graph(graph);
    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::from([start]);
    let mut order = Vec::new();

    while let Some(id) = queue.pop_front() {
        if !visited.insert(id) {
            continue;
        }
        // Dangling ids end the branch
        let Some(list) = graph.edge_list(id) else {
            continue;
        };
        budget.step(id)?;
        order.push(id.to_string());

        for next in list.edges().iter().chain(list.next_ids()) {
            if !visited.contains(next.as_str()) {
                queue.push_back(next);
            }
        }
    }

    Ok(order)
}

/// Execution-order walk: every nested child subtree, then the successor
pub fn traverse_dfs(graph: &AdjacencyList, start: &str) -> GraphResult<Vec<String>> {
    if !graph.contains(start) {
        return Err(GraphError::not_found(start));
    }

    let mut budget = StepBudget::for_graph(graph);
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = vec![start];
    let mut order = Vec::new();

    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        let Some(list) = graph.edge_list(id) else {
            continue;
        };
        budget.step(id)?;
        order.push(id.to_string());

        // Successor goes in first so it pops after all children
        for next in list.next_ids() {
            if !visited.contains(next.as_str()) {
                stack.push(next);
            }
        }
        for child in list.edges().iter().rev() {
            if !visited.contains(child.as_str()) {
                stack.push(child);
            }
        }
    }

    Ok(order)
}

/// Whether `to` is reachable from `from` through `edges` and `next_ids`
///
/// Used before writing a link `to -> from`: a true result means the link
/// would close a cycle.
pub(crate) fn reaches(graph: &AdjacencyList, from: &str, to: &str) -> bool {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = vec![from];

    while let Some(id) = stack.pop() {
        if id == to {
            return true;
        }
        if !visited.insert(id) {
            continue;
        }
        let Some(list) = graph.edge_list(id) else {
            continue;
        };
        stack.extend(list.edges().iter().chain(list.next_ids()).map(String::as_str));
    }

    false
}

/// Whether linking `from -> to` would make `from` reachable from itself
pub(crate) fn closes_cycle(graph: &AdjacencyList, from: &str, to: &str) -> bool {
    from == to || reaches(graph, to, from)
}
