// Graph Errors
// Error taxonomy shared by the adjacency engine, the record store and the service

use std::io;
use thiserror::Error;

use crate::store::StoreError;

/// Result alias used throughout the engine
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors that can occur while materializing or mutating an execution graph
#[derive(Debug, Error)]
pub enum GraphError {
    /// Starting id (or the vertex being removed) is absent
    #[error("Vertex not found: {0}")]
    NotFound(String),

    /// Duplicate chain attachment or re-delivery with a divergent payload
    #[error("Conflict on vertex {id}: {message}")]
    Conflict { id: String, message: String },

    /// A mutation would break one of the adjacency invariants
    #[error("Invariant violation on vertex {id}: {message}")]
    InvariantViolation { id: String, message: String },

    /// A traversal exceeded its step budget, the graph contains a cycle
    #[error("Graph corruption detected at vertex {id}: traversal exceeded budget of {budget} steps")]
    GraphCorruption { id: String, budget: usize },

    /// Failure reported by an external record, outcome or detail store
    #[error("Upstream error: {0}")]
    Upstream(#[from] StoreError),

    #[error("Snapshot IO error: {0}")]
    SnapshotIo(#[from] io::Error),

    #[error("Snapshot encoding error: {0}")]
    SnapshotEncoding(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GraphError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn conflict(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            id: id.into(),
            message: message.into(),
        }
    }

    pub fn invariant(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            id: id.into(),
            message: message.into(),
        }
    }

    pub fn corruption(id: impl Into<String>, budget: usize) -> Self {
        Self::GraphCorruption {
            id: id.into(),
            budget,
        }
    }

    /// `GraphCorruption` is a kind of invariant violation
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::InvariantViolation { .. } | Self::GraphCorruption { .. }
        )
    }

    /// Only upstream failures are transient; callers retry them with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream(_))
    }
}
