// Incremental Graph Updates
// Streams single records into an existing adjacency list, tolerating out-of-order delivery

use super::adjacency::{AdjacencyList, EdgeList, PendingLink, ScopeKind};
use super::traversal::{closes_cycle, StepBudget};
use crate::converter::GraphVertexConverter;
use crate::error::{GraphError, GraphResult};
use crate::models::{ExecutionMode, NodeExecutionRecord};

use tracing::{debug, warn};

/// Where a freshly arrived vertex was attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Successor of its declared previous vertex
    Successor { previous: String },
    /// Appended to the parent's `edges`
    Child { parent: String },
    /// Starts a chain lane; the parent's scope now points at it
    ChainHead { parent: String },
    /// Appended after the current tail of the parent's chain lane
    ChainTail { parent: String, tail: String },
    /// Declared previous vertex has not arrived yet
    AwaitingPrevious { previous: String },
    /// Declared parent has not arrived yet
    AwaitingParent { parent: String },
    /// No resolvable link; starts its own component
    Root,
}

impl Placement {
    /// Vertex the placed vertex hangs from, when a link is written
    fn anchor(&self) -> Option<&str> {
        match self {
            Placement::Successor { previous } => Some(previous.as_str()),
            Placement::Child { parent } | Placement::ChainHead { parent } => Some(parent.as_str()),
            Placement::ChainTail { tail, .. } => Some(tail.as_str()),
            Placement::AwaitingPrevious { .. } | Placement::AwaitingParent { .. } | Placement::Root => {
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted {
        placement: Placement,
        /// Waiting vertices re-linked now that this one exists
        reconciled: Vec<String>,
    },
    /// Same record delivered again
    Duplicate,
    /// Same links, new status
    StatusRefreshed,
}

/// Append one record without rescanning history
///
/// Callers serialize calls per plan execution; the chain-tail walk and the
/// edge-list writes are not atomic as a unit. An error raised while
/// re-linking waiting vertices can leave a partial update behind, so callers
/// that need all-or-nothing semantics apply the record to a copy.
pub fn add_vertex(graph: &mut AdjacencyList, record: &NodeExecutionRecord) -> GraphResult<AddOutcome> {
    let converter = GraphVertexConverter::new();
    let id = record.id.as_str();

    if let Some(existing) = graph.vertex(id) {
        if converter.diverges(existing, record) {
            return Err(GraphError::conflict(
                id,
                "re-delivered with different links or execution mode",
            ));
        }
        if existing.status != record.display.status {
            graph.set_status(id, record.display.status);
            return Ok(AddOutcome::StatusRefreshed);
        }
        return Ok(AddOutcome::Duplicate);
    }

    if record.parent_id.as_deref() == Some(id) || record.previous_id.as_deref() == Some(id) {
        return Err(GraphError::invariant(id, "record links to itself"));
    }

    // Decide before mutating so a rejected record leaves the graph untouched
    let placement = plan_placement(graph, record)?;

    graph.insert(converter.convert(record), EdgeList::new(record.parent_id.clone()));
    apply_placement(graph, id, &placement);
    link_declared_next(graph, record);
    let reconciled = reconcile(graph, id)?;

    debug!(id, ?placement, reconciled = reconciled.len(), "added vertex");
    Ok(AddOutcome::Inserted {
        placement,
        reconciled,
    })
}

/// Detach a vertex and delete it from both maps
///
/// Vertices that still own children or a successor are rejected rather
/// than orphaning their descendants.
pub fn remove_vertex(graph: &mut AdjacencyList, record: &NodeExecutionRecord) -> GraphResult<()> {
    let id = record.id.as_str();
    let Some(list) = graph.edge_list(id) else {
        return Err(GraphError::not_found(id));
    };
    if list.has_descendants() {
        return Err(GraphError::invariant(
            id,
            "cannot remove a vertex that still has children or a successor",
        ));
    }

    let previous = list.prev_id().map(str::to_string);
    let parent = list.parent_id().map(str::to_string);

    if let Some(previous_list) = previous.as_deref().and_then(|p| graph.edge_list_mut(p)) {
        previous_list.next_ids.retain(|next| next != id);
    }
    if let Some(parent_list) = parent.as_deref().and_then(|p| graph.edge_list_mut(p)) {
        parent_list.edges.retain(|child| child != id);
        if parent_list.scope.chain_head() == Some(id) {
            parent_list.scope = ScopeKind::Fanout;
        }
    }

    graph.forget_waiter(id);
    graph.remove(id);
    debug!(id, "removed vertex");
    Ok(())
}

/// Pick the placement and make sure the vertices waiting on this record
/// can still be linked below it without closing a cycle
fn plan_placement(graph: &AdjacencyList, record: &NodeExecutionRecord) -> GraphResult<Placement> {
    let id = record.id.as_str();
    let placement = place(graph, record)?;

    if let Some(anchor) = placement.anchor() {
        for link in graph.awaiting(id) {
            let (PendingLink::Child(waiter) | PendingLink::Successor(waiter)) = link else {
                continue;
            };
            if closes_cycle(graph, anchor, waiter) {
                return Err(GraphError::invariant(
                    id,
                    format!(
                        "'{}' waits on this vertex but already leads to '{}'; linking would close a cycle",
                        waiter, anchor
                    ),
                ));
            }
        }
    }

    Ok(placement)
}

fn place(graph: &AdjacencyList, record: &NodeExecutionRecord) -> GraphResult<Placement> {
    let id = record.id.as_str();

    if let Some(previous) = &record.previous_id {
        return match graph.edge_list(previous) {
            Some(list) => {
                if let Some(existing) = list.next_id() {
                    return Err(GraphError::conflict(
                        id,
                        format!("'{}' already continues into '{}'", previous, existing),
                    ));
                }
                Ok(Placement::Successor {
                    previous: previous.clone(),
                })
            }
            None => Ok(Placement::AwaitingPrevious {
                previous: previous.clone(),
            }),
        };
    }

    match &record.parent_id {
        Some(parent) => match graph.edge_list(parent) {
            Some(list) => child_placement(graph, parent, list, record.execution_mode),
            None => Ok(Placement::AwaitingParent {
                parent: parent.clone(),
            }),
        },
        None => Ok(Placement::Root),
    }
}

fn child_placement(
    graph: &AdjacencyList,
    parent: &str,
    parent_list: &EdgeList,
    mode: ExecutionMode,
) -> GraphResult<Placement> {
    if mode != ExecutionMode::Chain {
        return Ok(Placement::Child {
            parent: parent.to_string(),
        });
    }
    let tail = match parent_list.scope() {
        ScopeKind::Fanout => None,
        ScopeKind::Chain { head } => lane_tail(graph, parent, head)?,
    };
    Ok(match tail {
        Some(tail) => Placement::ChainTail {
            parent: parent.to_string(),
            tail,
        },
        // A closed lane makes the next chain child start a new one
        None => Placement::ChainHead {
            parent: parent.to_string(),
        },
    })
}

/// Last vertex of the open lane starting at `head`, or `None` once the lane
/// has been closed by a declared next id or a foreign successor
fn lane_tail(graph: &AdjacencyList, scope: &str, head: &str) -> GraphResult<Option<String>> {
    let mut budget = StepBudget::for_graph(graph);
    let mut current = head;

    loop {
        budget.step(current)?;
        let Some(list) = graph.edge_list(current) else {
            return Err(GraphError::invariant(
                current,
                "chain lane references a vertex that is not materialized",
            ));
        };
        if list.next_id().is_none() {
            let open = graph
                .vertex(current)
                .is_some_and(|v| v.declared.next_id.is_none());
            return Ok(open.then(|| current.to_string()));
        }
        match graph.lane_successor(scope, current) {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
}

fn apply_placement(graph: &mut AdjacencyList, id: &str, placement: &Placement) {
    match placement {
        Placement::Successor { previous } => link_sequential(graph, previous, id),
        Placement::ChainTail { tail, .. } => link_sequential(graph, tail, id),
        Placement::Child { parent } => {
            if let Some(list) = graph.edge_list_mut(parent) {
                list.edges.push(id.to_string());
            }
        }
        Placement::ChainHead { parent } => {
            if let Some(list) = graph.edge_list_mut(parent) {
                list.edges.push(id.to_string());
                list.scope = ScopeKind::Chain {
                    head: id.to_string(),
                };
            }
        }
        Placement::AwaitingPrevious { previous } => {
            if let Some(list) = graph.edge_list_mut(id) {
                list.prev_ids = vec![previous.clone()];
            }
            graph.add_pending(previous, PendingLink::Successor(id.to_string()));
        }
        Placement::AwaitingParent { parent } => {
            graph.add_pending(parent, PendingLink::Child(id.to_string()));
        }
        Placement::Root => {
            debug!(id, components = graph.roots().len(), "vertex has no resolvable link");
        }
    }
}

fn link_sequential(graph: &mut AdjacencyList, from: &str, to: &str) {
    if let Some(list) = graph.edge_list_mut(from) {
        list.next_ids = vec![to.to_string()];
    }
    if let Some(list) = graph.edge_list_mut(to) {
        list.prev_ids = vec![from.to_string()];
    }
}

/// Honor an explicit `next_id`, now or once the target arrives
fn link_declared_next(graph: &mut AdjacencyList, record: &NodeExecutionRecord) {
    let id = record.id.as_str();
    let Some(next) = record.next_id.as_deref() else {
        return;
    };
    if next == id || record.parent_id.as_deref() == Some(next) {
        warn!(id, next, "ignoring next id that points at itself or its enclosing scope");
        return;
    }
    if !graph.contains(next) {
        graph.add_pending(next, PendingLink::Predecessor(id.to_string()));
        return;
    }

    let free = graph.edge_list(next).is_some_and(|l| l.prev_ids().is_empty())
        && graph.edge_list(id).is_some_and(|l| l.next_ids().is_empty());
    if !free {
        debug!(id, next, "declared next already linked elsewhere");
    } else if closes_cycle(graph, id, next) {
        warn!(id, next, "declared next already leads back here, leaving it unlinked");
    } else {
        link_sequential(graph, id, next);
    }
}

/// Re-link every vertex that was waiting for `id`
fn reconcile(graph: &mut AdjacencyList, id: &str) -> GraphResult<Vec<String>> {
    let mut waiting = graph.take_pending(id);
    if waiting.is_empty() {
        return Ok(Vec::new());
    }

    // Children attach in creation order so chain lanes come out the same as causal delivery
    waiting.sort_by_key(|link| {
        let created_at = graph.vertex(link.waiter()).map(|v| v.created_at);
        (created_at, link.waiter().to_string())
    });

    let mut reconciled = Vec::with_capacity(waiting.len());
    let mut links = waiting.into_iter();
    while let Some(link) = links.next() {
        match reconcile_link(graph, id, &link) {
            Ok(true) => reconciled.push(link.waiter().to_string()),
            Ok(false) => {}
            Err(e) => {
                // Links not yet applied stay registered against `id`
                graph.add_pending(id, link);
                for rest in links.by_ref() {
                    graph.add_pending(id, rest);
                }
                return Err(e);
            }
        }
    }

    Ok(reconciled)
}

/// Apply one waiting link; `false` when it was dropped instead
fn reconcile_link(graph: &mut AdjacencyList, id: &str, link: &PendingLink) -> GraphResult<bool> {
    let Some(vertex) = graph.vertex(link.waiter()) else {
        return Ok(false);
    };

    match link {
        PendingLink::Child(child) => {
            let mode = vertex.mode;
            let Some(parent_list) = graph.edge_list(id) else {
                return Ok(false);
            };
            let placement = child_placement(graph, id, parent_list, mode)?;
            let anchor = placement.anchor().unwrap_or(id);
            if closes_cycle(graph, anchor, child) {
                warn!(id, child = %child, "waiting child already leads back here, leaving it detached");
                return Ok(false);
            }
            apply_placement(graph, child, &placement);
        }
        PendingLink::Successor(successor) => {
            let occupied = graph.edge_list(id).and_then(|l| l.next_id()).is_some();
            if occupied || closes_cycle(graph, id, successor) {
                warn!(id, successor = %successor, "cannot continue into waiting successor, detaching it");
                if let Some(list) = graph.edge_list_mut(successor) {
                    list.prev_ids.clear();
                }
                return Ok(false);
            }
            link_sequential(graph, id, successor);
        }
        PendingLink::Predecessor(predecessor) => {
            let free = graph.edge_list(predecessor).is_some_and(|l| l.next_ids().is_empty())
                && graph.edge_list(id).is_some_and(|l| l.prev_ids().is_empty());
            if !free {
                return Ok(false);
            }
            if closes_cycle(graph, predecessor, id) {
                warn!(id, predecessor = %predecessor, "declared next already leads back to its predecessor, leaving it unlinked");
                return Ok(false);
            }
            link_sequential(graph, predecessor, id);
        }
    }
    Ok(true)
}
