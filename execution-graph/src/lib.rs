// Execution Graph Library
// Materializes node execution records into an adjacency list for status polling and visualization

pub mod config;
pub mod converter;
pub mod error;
pub mod events;
pub mod graph;
pub mod models;
pub mod service;
pub mod snapshot;
pub mod store;

// Re-export commonly used types
pub use config::EngineConfig;
pub use converter::GraphVertexConverter;
pub use error::{GraphError, GraphResult};
pub use models::{
    sort_by_arrival, DisplayPayload, ExecutionMode, ExecutionStatus, NodeExecutionRecord, Outcome,
    OutcomeMap, StepDetail, StepDetailMap,
};

// Re-export graph types
pub use graph::{
    add_vertex, check_invariants, export, extract_subgraph, generate, remove_vertex, render_tree,
    traverse, traverse_bfs, traverse_dfs, AddOutcome, AdjacencyList, EdgeList, GraphExport,
    GraphVertex, Placement, ScopeKind, StepBudget, TraversalOrder,
};

// Re-export service types
pub use events::{event_channel, event_stream, EventSender, GraphEvent, GraphEventSender};
pub use service::GraphService;
pub use snapshot::SnapshotStore;
pub use store::{ExecutionStore, InMemoryStore, StoreDocument, StoreError};
