// Adjacency List
// Vertex and edge-list containers shared by every graph algorithm in this module

use crate::models::{ExecutionMode, ExecutionStatus, OutcomeMap, StepDetailMap};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Display-oriented projection of a node execution record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphVertex {
    pub id: String,
    pub name: String,
    pub identifier: Option<String>,
    pub step_type: Option<String>,
    pub mode: ExecutionMode,
    pub status: ExecutionStatus,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub ended_at: Option<i64>,
    /// Links exactly as the record declared them
    pub declared: DeclaredLinks,
    /// Resolved lazily, `None` until a caller asks for full detail
    #[serde(default)]
    pub outcomes: Option<OutcomeMap>,
    #[serde(default)]
    pub step_details: Option<StepDetailMap>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclaredLinks {
    pub parent_id: Option<String>,
    pub previous_id: Option<String>,
    pub next_id: Option<String>,
}

impl GraphVertex {
    pub fn has_details(&self) -> bool {
        self.outcomes.is_some() && self.step_details.is_some()
    }
}

/// How a scope lays out its children
///
/// Decided when the first child is inserted. A scope that receives a
/// chain-mode child switches to `Chain` exactly once; later chain-mode
/// children extend the lane starting at `head` instead of widening `edges`.
/// Normal children of the same scope keep fanning out next to the lane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ScopeKind {
    #[default]
    Fanout,
    Chain { head: String },
}

impl ScopeKind {
    pub fn chain_head(&self) -> Option<&str> {
        match self {
            ScopeKind::Fanout => None,
            ScopeKind::Chain { head } => Some(head),
        }
    }
}

/// Forward, backward and nesting links of one vertex
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeList {
    /// Nested children in arrival order
    pub(crate) edges: Vec<String>,
    /// At most one entry
    pub(crate) next_ids: Vec<String>,
    /// At most one entry, inverse of `next_ids`
    pub(crate) prev_ids: Vec<String>,
    pub(crate) parent_id: Option<String>,
    pub(crate) scope: ScopeKind,
}

impl EdgeList {
    pub fn new(parent_id: Option<String>) -> Self {
        Self {
            parent_id,
            ..Default::default()
        }
    }

    pub fn edges(&self) -> &[String] {
        &self.edges
    }

    pub fn next_ids(&self) -> &[String] {
        &self.next_ids
    }

    pub fn prev_ids(&self) -> &[String] {
        &self.prev_ids
    }

    pub fn next_id(&self) -> Option<&str> {
        self.next_ids.first().map(String::as_str)
    }

    pub fn prev_id(&self) -> Option<&str> {
        self.prev_ids.first().map(String::as_str)
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    pub fn scope(&self) -> &ScopeKind {
        &self.scope
    }

    /// True when the vertex still owns children or a successor
    pub fn has_descendants(&self) -> bool {
        !self.edges.is_empty() || !self.next_ids.is_empty()
    }
}

/// A link waiting for a vertex that has not been materialized yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "id")]
pub enum PendingLink {
    /// `id` declared the missing vertex as its parent
    Child(String),
    /// `id` declared the missing vertex as its previous; `id.prev_ids` already dangles
    Successor(String),
    /// `id` declared the missing vertex as its next
    Predecessor(String),
}

impl PendingLink {
    pub fn waiter(&self) -> &str {
        match self {
            PendingLink::Child(id) | PendingLink::Successor(id) | PendingLink::Predecessor(id) => {
                id
            }
        }
    }
}

/// The materialized execution graph of one plan execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjacencyList {
    graph_vertex_map: HashMap<String, GraphVertex>,
    adjacency_map: HashMap<String, EdgeList>,
    /// Missing id -> links waiting for it, in arrival order
    #[serde(default)]
    pending: BTreeMap<String, Vec<PendingLink>>,
}

impl AdjacencyList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.graph_vertex_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph_vertex_map.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.adjacency_map.contains_key(id)
    }

    pub fn vertex(&self, id: &str) -> Option<&GraphVertex> {
        self.graph_vertex_map.get(id)
    }

    pub fn edge_list(&self, id: &str) -> Option<&EdgeList> {
        self.adjacency_map.get(id)
    }

    pub fn vertices(&self) -> impl Iterator<Item = &GraphVertex> {
        self.graph_vertex_map.values()
    }

    pub fn edge_lists(&self) -> impl Iterator<Item = (&String, &EdgeList)> {
        self.adjacency_map.iter()
    }

    /// Vertex ids sorted for deterministic output
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.adjacency_map.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Ids referenced by some link but not materialized yet
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.pending.keys().map(String::as_str)
    }

    pub fn is_placeholder(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    /// Links waiting for `id` to arrive
    pub fn awaiting(&self, id: &str) -> &[PendingLink] {
        self.pending.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Vertices not reachable through any materialized `edges` or `next_ids`
    /// entry, ordered by creation time then id
    pub fn roots(&self) -> Vec<&GraphVertex> {
        let referenced: HashSet<&str> = self
            .adjacency_map
            .values()
            .flat_map(|list| list.edges.iter().chain(list.next_ids.iter()))
            .map(String::as_str)
            .collect();

        let mut roots: Vec<&GraphVertex> = self
            .graph_vertex_map
            .values()
            .filter(|vertex| !referenced.contains(vertex.id.as_str()))
            .collect();
        roots.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        roots
    }

    /// Compare link structure only, ignoring vertex payloads
    pub fn same_shape(&self, other: &AdjacencyList) -> bool {
        self.adjacency_map == other.adjacency_map
    }

    /// Next vertex of `member`'s chain lane inside `scope`, if the lane goes on
    ///
    /// A member that declared its own next id closes its lane, and so does a
    /// successor that is not itself a chain-mode child of `scope`.
    pub fn lane_successor(&self, scope: &str, member: &str) -> Option<&str> {
        if self.vertex(member)?.declared.next_id.is_some() {
            return None;
        }
        let next = self.edge_list(member)?.next_id()?;
        let vertex = self.vertex(next)?;
        let continues = vertex.mode == ExecutionMode::Chain
            && vertex.declared.parent_id.as_deref() == Some(scope)
            && vertex.declared.previous_id.is_none();
        continues.then_some(next)
    }

    /// Refresh the only mutable vertex attribute
    pub(crate) fn set_status(&mut self, id: &str, status: ExecutionStatus) -> bool {
        match self.graph_vertex_map.get_mut(id) {
            Some(vertex) => {
                vertex.status = status;
                true
            }
            None => false,
        }
    }

    pub(crate) fn vertex_mut(&mut self, id: &str) -> Option<&mut GraphVertex> {
        self.graph_vertex_map.get_mut(id)
    }

    pub(crate) fn edge_list_mut(&mut self, id: &str) -> Option<&mut EdgeList> {
        self.adjacency_map.get_mut(id)
    }

    pub(crate) fn insert(&mut self, vertex: GraphVertex, edge_list: EdgeList) {
        self.adjacency_map.insert(vertex.id.clone(), edge_list);
        self.graph_vertex_map.insert(vertex.id.clone(), vertex);
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<(GraphVertex, EdgeList)> {
        let vertex = self.graph_vertex_map.remove(id)?;
        let edge_list = self.adjacency_map.remove(id)?;
        Some((vertex, edge_list))
    }

    pub(crate) fn add_pending(&mut self, missing_id: &str, link: PendingLink) {
        let waiting = self.pending.entry(missing_id.to_string()).or_default();
        if !waiting.contains(&link) {
            waiting.push(link);
        }
    }

    pub(crate) fn take_pending(&mut self, id: &str) -> Vec<PendingLink> {
        self.pending.remove(id).unwrap_or_default()
    }

    /// Drop every pending link registered by `waiter`
    pub(crate) fn forget_waiter(&mut self, waiter: &str) {
        self.pending.retain(|_, links| {
            links.retain(|link| link.waiter() != waiter);
            !links.is_empty()
        });
    }
}
