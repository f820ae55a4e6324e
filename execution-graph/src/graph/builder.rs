// Graph Builder
// Materializes a complete adjacency list from the records of one plan execution

use super::adjacency::{AdjacencyList, EdgeList, ScopeKind};
use super::traversal::{closes_cycle, StepBudget};
use crate::converter::GraphVertexConverter;
use crate::error::{GraphError, GraphResult};
use crate::models::{ExecutionMode, NodeExecutionRecord};

use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

/// Build the graph reachable from `starting_id`
pub fn generate(starting_id: &str, records: &[NodeExecutionRecord]) -> GraphResult<AdjacencyList> {
    GraphGenerator::new(records).generate(starting_id)
}

/// Index over one plan execution's records, built once per generation pass
pub struct GraphGenerator<'a> {
    converter: GraphVertexConverter,
    by_id: HashMap<&'a str, &'a NodeExecutionRecord>,
    /// Scope children (no previous link) ordered by creation time then id
    children_by_parent: HashMap<&'a str, Vec<&'a str>>,
    /// Parent -> head of its most recent chain lane
    chain_heads: HashMap<&'a str, &'a str>,
    lane_heads: HashSet<&'a str>,
    chain_successor: HashMap<&'a str, &'a str>,
    /// Previous -> record declaring it
    successor_by_previous: HashMap<&'a str, &'a str>,
}

impl<'a> GraphGenerator<'a> {
    pub fn new(records: &'a [NodeExecutionRecord]) -> Self {
        // The store promises creation order; sort anyway
        let mut ordered: Vec<&'a NodeExecutionRecord> = records.iter().collect();
        ordered.sort_by(|a, b| a.arrival_key().cmp(&b.arrival_key()));

        let mut by_id: HashMap<&'a str, &'a NodeExecutionRecord> = HashMap::with_capacity(ordered.len());
        let mut children_by_parent: HashMap<&'a str, Vec<&'a str>> = HashMap::new();
        let mut successor_by_previous = HashMap::new();

        for record in &ordered {
            if by_id.contains_key(record.id.as_str()) {
                warn!(id = %record.id, "duplicate node execution record, keeping the first");
                continue;
            }
            by_id.insert(record.id.as_str(), *record);

            match (&record.previous_id, &record.parent_id) {
                (Some(previous), _) => {
                    successor_by_previous
                        .entry(previous.as_str())
                        .or_insert(record.id.as_str());
                }
                (None, Some(parent)) => {
                    children_by_parent
                        .entry(parent.as_str())
                        .or_default()
                        .push(record.id.as_str());
                }
                (None, None) => {}
            }
        }

        let mut chain_heads = HashMap::new();
        let mut lane_heads = HashSet::new();
        let mut chain_successor = HashMap::new();
        for (parent, children) in &children_by_parent {
            let mut open_tail: Option<&'a str> = None;
            for child in children.iter().copied() {
                let record = by_id[child];
                if record.execution_mode != ExecutionMode::Chain {
                    continue;
                }
                match open_tail {
                    Some(tail) => {
                        chain_successor.insert(tail, child);
                    }
                    None => {
                        lane_heads.insert(child);
                        chain_heads.insert(*parent, child);
                    }
                }
                // A member with its own next, or taken as someone's previous, closes the lane
                let closes = record.next_id.is_some() || successor_by_previous.contains_key(child);
                open_tail = (!closes).then_some(child);
            }
        }

        Self {
            converter: GraphVertexConverter::new(),
            by_id,
            children_by_parent,
            chain_heads,
            lane_heads,
            chain_successor,
            successor_by_previous,
        }
    }

    pub fn record(&self, id: &str) -> Option<&'a NodeExecutionRecord> {
        self.by_id.get(id).copied()
    }

    /// Children registered in the scope's `edges`; a chain lane contributes its head only
    fn scope_children(&self, id: &str) -> Vec<&'a str> {
        let Some(children) = self.children_by_parent.get(id) else {
            return Vec::new();
        };

        children
            .iter()
            .copied()
            .filter(|child| {
                self.by_id[child].execution_mode != ExecutionMode::Chain
                    || self.lane_heads.contains(child)
            })
            .collect()
    }

    /// Explicit `next_id` wins over links inferred from previous ids or chains
    fn resolve_next(&self, record: &'a NodeExecutionRecord) -> Option<&'a str> {
        let id = record.id.as_str();
        let candidate = match record.next_id.as_deref() {
            Some(next) if self.by_id.contains_key(next) => Some(next),
            Some(next) => {
                debug!(id, next, "next id not among the records, leaving it unlinked");
                None
            }
            None => self
                .successor_by_previous
                .get(id)
                .or_else(|| self.chain_successor.get(id))
                .copied(),
        }?;

        if candidate == id {
            warn!(id, "ignoring self-referencing next id");
            return None;
        }
        if record.parent_id.as_deref() == Some(candidate) {
            warn!(id, next = candidate, "ignoring next id that points at the enclosing scope");
            return None;
        }
        Some(candidate)
    }

    /// Breadth-first materialization seeded at `starting_id`
    ///
    /// Links are written as vertices are dequeued. A link whose target can
    /// already reach the current vertex would close a cycle and is dropped.
    pub fn generate(&self, starting_id: &str) -> GraphResult<AdjacencyList> {
        let Some(start) = self.by_id.get(starting_id) else {
            return Err(GraphError::not_found(starting_id));
        };
        let start = start.id.as_str();

        let mut graph = AdjacencyList::new();
        let mut budget = StepBudget::new(self.by_id.len());
        let mut visited: HashSet<&str> = HashSet::new();
        // The start is the root of the result and never gains a predecessor
        let mut claimed: HashSet<&str> = HashSet::from([start]);
        let mut links: Vec<(&str, &str)> = Vec::new();
        let mut queue: VecDeque<&str> = VecDeque::from([start]);

        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            let Some(record) = self.record(id) else {
                continue;
            };
            budget.step(id)?;

            let mut edge_list = EdgeList::new(record.parent_id.clone());
            for child in self.scope_children(id) {
                // Parent ids that loop back on themselves
                if closes_cycle(&graph, id, child) {
                    warn!(id, child, "child already leads back to its parent, leaving it out");
                    continue;
                }
                edge_list.edges.push(child.to_string());
                queue.push_back(child);
            }
            if let Some(head) = self.chain_heads.get(id) {
                if edge_list.edges.iter().any(|child| child.as_str() == *head) {
                    edge_list.scope = ScopeKind::Chain {
                        head: head.to_string(),
                    };
                }
            }
            graph.insert(self.converter.convert(record), edge_list);

            let Some(next) = self.resolve_next(record) else {
                continue;
            };
            if closes_cycle(&graph, id, next) {
                warn!(id, next, "next id already leads back here, leaving it unlinked");
            } else if !claimed.insert(next) {
                warn!(id, next, "next id already claimed by another predecessor");
            } else {
                if let Some(list) = graph.edge_list_mut(id) {
                    list.next_ids.push(next.to_string());
                }
                links.push((id, next));
                queue.push_back(next);
            }
        }

        for (prev, next) in links {
            if let Some(list) = graph.edge_list_mut(next) {
                list.prev_ids = vec![prev.to_string()];
            }
        }

        debug!(
            starting_id,
            vertices = graph.len(),
            records = self.by_id.len(),
            "generated execution graph"
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::validate::check_invariants;

    fn record(id: &str, created_at: i64) -> NodeExecutionRecord {
        NodeExecutionRecord::new("plan", id, created_at)
    }

    fn chain(id: &str, parent: &str, created_at: i64) -> NodeExecutionRecord {
        record(id, created_at)
            .with_parent(parent)
            .with_mode(ExecutionMode::Chain)
    }

    fn edges<'g>(graph: &'g AdjacencyList, id: &str) -> &'g [String] {
        graph.edge_list(id).unwrap().edges()
    }

    #[test]
    fn test_mixed_fanout_and_chain_children() {
        let records = vec![
            record("A", 1),
            record("B", 2).with_parent("A"),
            chain("C", "A", 3),
            chain("D", "A", 4),
        ];

        let graph = generate("A", &records).unwrap();

        assert_eq!(edges(&graph, "A"), &["B", "C"]);
        assert_eq!(graph.edge_list("C").unwrap().next_ids(), &["D"]);
        assert!(edges(&graph, "C").is_empty());
        assert_eq!(graph.edge_list("D").unwrap().prev_ids(), &["C"]);
        assert_eq!(
            graph.edge_list("A").unwrap().scope(),
            &ScopeKind::Chain {
                head: "C".to_string()
            }
        );
        check_invariants(&graph).unwrap();
    }

    #[test]
    fn test_chain_collapses_to_head() {
        let mut records = vec![record("P", 0)];
        for i in 0..5 {
            records.push(chain(&format!("c{}", i), "P", 10 + i));
        }

        let graph = generate("P", &records).unwrap();
        assert_eq!(edges(&graph, "P"), &["c0"]);

        let mut current = "c0".to_string();
        for _ in 0..4 {
            current = graph.edge_list(&current).unwrap().next_ids()[0].clone();
        }
        assert_eq!(current, "c4");
        assert!(graph.edge_list("c4").unwrap().next_ids().is_empty());
    }

    #[test]
    fn test_unknown_start_is_not_found() {
        let records = vec![record("A", 1)];
        let err = generate("missing", &records).unwrap_err();
        assert!(matches!(err, GraphError::NotFound(id) if id == "missing"));
    }

    #[test]
    fn test_children_ordered_by_timestamp_then_id() {
        let records = vec![
            record("root", 0),
            record("z", 5).with_parent("root"),
            record("b", 5).with_parent("root"),
            record("a", 7).with_parent("root"),
        ];

        let graph = generate("root", &records).unwrap();
        assert_eq!(edges(&graph, "root"), &["b", "z", "a"]);
    }

    #[test]
    fn test_unsorted_input_is_resorted() {
        let records = vec![
            chain("c1", "P", 20),
            record("P", 0),
            chain("c0", "P", 10),
        ];

        let graph = generate("P", &records).unwrap();
        assert_eq!(edges(&graph, "P"), &["c0"]);
        assert_eq!(graph.edge_list("c0").unwrap().next_ids(), &["c1"]);
    }

    #[test]
    fn test_explicit_next_wins_over_chain_successor() {
        let records = vec![
            record("P", 0),
            chain("c0", "P", 1).with_next("summary"),
            chain("c1", "P", 2),
            record("summary", 3),
        ];

        let graph = generate("P", &records).unwrap();
        assert_eq!(graph.edge_list("c0").unwrap().next_ids(), &["summary"]);
        assert_eq!(graph.edge_list("summary").unwrap().prev_ids(), &["c0"]);

        // c0 closed its lane, so c1 heads a new one
        assert_eq!(edges(&graph, "P"), &["c0", "c1"]);
        assert_eq!(graph.edge_list("P").unwrap().scope().chain_head(), Some("c1"));
        assert!(graph.edge_list("c1").unwrap().prev_ids().is_empty());
        check_invariants(&graph).unwrap();
    }

    #[test]
    fn test_previous_links_are_followed() {
        let records = vec![
            record("stage", 0),
            record("s1", 1).with_parent("stage"),
            record("s2", 2).with_parent("stage").with_previous("s1"),
        ];

        let graph = generate("stage", &records).unwrap();
        assert_eq!(edges(&graph, "stage"), &["s1"]);
        assert_eq!(graph.edge_list("s1").unwrap().next_ids(), &["s2"]);
        assert_eq!(graph.edge_list("s2").unwrap().prev_ids(), &["s1"]);
        assert_eq!(graph.edge_list("s2").unwrap().parent_id(), Some("stage"));
    }

    #[test]
    fn test_next_into_enclosing_scope_is_ignored() {
        let records = vec![
            record("group", 0),
            record("step", 1).with_parent("group").with_next("group"),
        ];

        let graph = generate("group", &records).unwrap();
        assert!(graph.edge_list("step").unwrap().next_ids().is_empty());
        check_invariants(&graph).unwrap();
    }

    #[test]
    fn test_self_next_is_ignored() {
        let records = vec![record("loop", 0).with_next("loop")];

        let graph = generate("loop", &records).unwrap();
        assert!(graph.edge_list("loop").unwrap().next_ids().is_empty());
    }

    #[test]
    fn test_unreachable_records_are_left_out() {
        let records = vec![record("A", 0), record("B", 1).with_parent("A"), record("X", 2)];

        let graph = generate("A", &records).unwrap();
        assert_eq!(graph.len(), 2);
        assert!(!graph.contains("X"));
    }

    #[test]
    fn test_mutual_next_ids_do_not_cycle() {
        let records = vec![record("a", 0).with_next("b"), record("b", 1).with_next("a")];

        let graph = generate("a", &records).unwrap();
        assert_eq!(graph.edge_list("a").unwrap().next_ids(), &["b"]);
        assert!(graph.edge_list("a").unwrap().prev_ids().is_empty());
        assert!(graph.edge_list("b").unwrap().next_ids().is_empty());
        check_invariants(&graph).unwrap();
    }

    #[test]
    fn test_next_into_an_ancestor_is_ignored() {
        let records = vec![
            record("stage", 0),
            record("group", 1).with_parent("stage"),
            record("step", 2).with_parent("group").with_next("stage"),
        ];

        let graph = generate("stage", &records).unwrap();
        assert!(graph.edge_list("step").unwrap().next_ids().is_empty());
        assert!(graph.edge_list("stage").unwrap().prev_ids().is_empty());
        check_invariants(&graph).unwrap();
    }

    #[test]
    fn test_looping_parent_ids_do_not_cycle() {
        let records = vec![record("a", 0).with_parent("b"), record("b", 1).with_parent("a")];

        let graph = generate("a", &records).unwrap();
        assert_eq!(edges(&graph, "a"), &["b"]);
        assert!(edges(&graph, "b").is_empty());
        check_invariants(&graph).unwrap();
    }

    #[test]
    fn test_first_duplicate_record_wins() {
        let records = vec![
            record("P", 0),
            record("Q", 1),
            record("X", 2).with_parent("P"),
            chain("X", "Q", 3),
        ];

        let graph = generate("P", &records).unwrap();
        assert_eq!(edges(&graph, "P"), &["X"]);
        assert_eq!(graph.edge_list("X").unwrap().parent_id(), Some("P"));
        assert_eq!(graph.vertex("X").unwrap().mode, ExecutionMode::Normal);
        check_invariants(&graph).unwrap();

        let from_q = generate("Q", &records).unwrap();
        assert!(edges(&from_q, "Q").is_empty());
        assert_eq!(from_q.len(), 1);
    }
}
