// Graph Module
// Adjacency list construction, incremental maintenance, extraction and traversal

pub mod adjacency;
pub mod builder;
pub mod incremental;
pub mod render;
pub mod subgraph;
pub mod traversal;
pub mod validate;

// Re-export key types
pub use adjacency::{AdjacencyList, DeclaredLinks, EdgeList, GraphVertex, PendingLink, ScopeKind};
pub use builder::{generate, GraphGenerator};
pub use incremental::{add_vertex, remove_vertex, AddOutcome, Placement};
pub use render::{export, render_tree, EdgeKind, ExportEdge, ExportNode, GraphExport};
pub use subgraph::extract_subgraph;
pub use traversal::{traverse, traverse_bfs, traverse_dfs, StepBudget, TraversalOrder};
pub use validate::check_invariants;
